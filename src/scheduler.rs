use std::future::Future;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{error, info, warn};

/// The first moment strictly after `now` whose time of day is `at`.
pub fn next_run_after(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        return today;
    }
    now.date()
        .succ_opt()
        .map(|tomorrow| tomorrow.and_time(at))
        .unwrap_or(today)
}

/// Runs `job` once a day at local time `at` until Ctrl-C. Each run receives
/// the local date it fired on. Runs never overlap; a failed run is logged
/// and the schedule keeps going.
pub async fn run_daily<F, Fut>(at: NaiveTime, job: F) -> anyhow::Result<()>
where
    F: FnMut(NaiveDate) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    run_daily_until(at, job, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Like [`run_daily`], stopping as soon as `shutdown` completes, whether the
/// scheduler is waiting or a run is in progress. An interrupted run is
/// dropped, so it publishes nothing.
pub async fn run_daily_until<F, Fut, S>(at: NaiveTime, mut job: F, shutdown: S) -> anyhow::Result<()>
where
    F: FnMut(NaiveDate) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let now = Local::now().naive_local();
        let next = next_run_after(now, at);
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next_run = %next, wait_secs = wait.as_secs(), "waiting for next scheduled run");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = &mut shutdown => {
                info!("shutting down scheduler");
                return Ok(());
            }
        }

        let as_of = next.date();
        tokio::select! {
            result = job(as_of) => match result {
                Ok(()) => info!(%as_of, "scheduled run finished"),
                Err(err) => error!(%as_of, error = %format!("{err:#}"), "scheduled run failed"),
            },
            _ = &mut shutdown => {
                warn!(%as_of, "shutting down during a scheduled run");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::oneshot;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn moment(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn fires_later_today_when_time_not_reached() {
        assert_eq!(
            next_run_after(moment(2024, 5, 1, 9, 0), at(10, 30)),
            moment(2024, 5, 1, 10, 30)
        );
    }

    #[test]
    fn fires_tomorrow_once_time_has_passed() {
        assert_eq!(
            next_run_after(moment(2024, 5, 1, 10, 30), at(10, 30)),
            moment(2024, 5, 2, 10, 30)
        );
        assert_eq!(
            next_run_after(moment(2024, 12, 31, 23, 0), at(10, 30)),
            moment(2025, 1, 1, 10, 30)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_a_running_job() {
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let mut started_tx = Some(started_tx);
        let runs = Arc::new(AtomicUsize::new(0));
        let job_runs = runs.clone();

        let result = run_daily_until(
            at(10, 30),
            move |_| {
                job_runs.fetch_add(1, Ordering::SeqCst);
                if let Some(tx) = started_tx.take() {
                    let _ = tx.send(());
                }
                async { std::future::pending::<anyhow::Result<()>>().await }
            },
            async {
                let _ = started_rx.await;
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_runs_keep_the_schedule_alive() {
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let mut done_tx = Some(done_tx);
        let runs = Arc::new(AtomicUsize::new(0));
        let job_runs = runs.clone();

        run_daily_until(
            at(10, 30),
            move |_| {
                let count = job_runs.fetch_add(1, Ordering::SeqCst) + 1;
                if count == 2 {
                    if let Some(tx) = done_tx.take() {
                        let _ = tx.send(());
                    }
                }
                async { Err(anyhow::anyhow!("dataset unavailable")) }
            },
            async {
                let _ = done_rx.await;
            },
        )
        .await
        .unwrap();

        assert!(runs.load(Ordering::SeqCst) >= 2);
    }
}
