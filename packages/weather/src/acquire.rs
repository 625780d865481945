//! Monthly archive acquisition under a wall-clock deadline.
//!
//! Months are grouped into batches of at most [`MAX_MONTHS_PER_BATCH`].
//! Batches run one after another; the months inside a batch are submitted
//! and polled concurrently. One deadline, fixed when acquisition starts,
//! bounds every batch.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::future::try_join_all;
use heating_emissions_weather_models::{DATASET, RetrievalRequest};
use tokio::time::Instant;

use crate::{ClimateDataStore, RemoteJob, WeatherError};

/// Largest number of months requested concurrently.
pub const MAX_MONTHS_PER_BATCH: u32 = 4;

/// What to download and where to cache it.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionRequest {
    /// AOI display name; part of the cache file name.
    pub aoi_name: String,
    /// `[north, west, south, east]` in degrees.
    pub area: [f64; 4],
    /// Target year.
    pub year: i32,
    /// Months to fetch, 1-12.
    pub months: RangeInclusive<u32>,
    /// Archive cache directory.
    pub target_dir: PathBuf,
    /// Interval between readiness checks.
    pub poll_interval: Duration,
}

/// Cache path of the archive for one month:
/// `era5_data_{lowercase name}_{year}_{month}.zip`.
#[must_use]
pub fn archive_path(dir: &Path, aoi_name: &str, year: i32, month: u32) -> PathBuf {
    dir.join(format!(
        "era5_data_{}_{year}_{month}.zip",
        aoi_name.to_lowercase()
    ))
}

/// Splits `first..=last` into consecutive batches of at most `size` months.
#[must_use]
pub fn month_batches(first: u32, last: u32, size: u32) -> Vec<RangeInclusive<u32>> {
    let size = size.max(1);
    let mut batches = Vec::new();
    let mut start = first;
    while start <= last {
        let end = last.min(start + size - 1);
        batches.push(start..=end);
        start = end + 1;
    }
    batches
}

/// Polls `job` until it is ready, then downloads it to `target`.
///
/// # Errors
///
/// Returns [`WeatherError::DeadlineExceeded`] if `target` does not exist
/// once the deadline has passed, or the job's own error.
pub async fn poll_until_downloaded(
    job: &dyn RemoteJob,
    target: &Path,
    deadline: Instant,
    interval: Duration,
) -> Result<(), WeatherError> {
    while Instant::now() < deadline {
        if job.is_ready().await? {
            job.download(target).await?;
            break;
        }
        tokio::time::sleep(interval).await;
    }

    if target.exists() {
        Ok(())
    } else {
        Err(WeatherError::DeadlineExceeded {
            target: target.display().to_string(),
        })
    }
}

/// Fetches one month unless it is already cached.
async fn download_month(
    store: &dyn ClimateDataStore,
    request: &AcquisitionRequest,
    month: u32,
    deadline: Instant,
) -> Result<PathBuf, WeatherError> {
    let target = archive_path(&request.target_dir, &request.aoi_name, request.year, month);
    if target.exists() {
        log::debug!("{} already exists, skipping", target.display());
        return Ok(target);
    }

    log::debug!("{} doesn't exist, downloading...", target.display());
    let body = RetrievalRequest::monthly(request.year, month, request.area);
    let job = store.submit(DATASET, &body).await?;
    poll_until_downloaded(job.as_ref(), &target, deadline, request.poll_interval).await?;

    Ok(target)
}

/// Fetches every month of `months` concurrently.
///
/// # Errors
///
/// Returns the first error of any month.
pub async fn download_months(
    store: &dyn ClimateDataStore,
    request: &AcquisitionRequest,
    months: RangeInclusive<u32>,
    deadline: Instant,
) -> Result<Vec<PathBuf>, WeatherError> {
    try_join_all(months.map(|month| download_month(store, request, month, deadline))).await
}

/// Ensures one archive per requested month exists, with a deadline of
/// `runtime_limit` from now.
///
/// # Errors
///
/// See [`acquire_until`].
pub async fn acquire(
    store: &dyn ClimateDataStore,
    request: &AcquisitionRequest,
    runtime_limit: Duration,
) -> Result<Vec<PathBuf>, WeatherError> {
    acquire_until(store, request, Instant::now() + runtime_limit, runtime_limit).await
}

/// Ensures one archive per requested month exists before `deadline`.
///
/// `runtime_limit` is only used for the error message.
///
/// # Errors
///
/// * [`WeatherError::Timeout`] if any month is missing when the deadline
///   passes
/// * [`WeatherError::Service`] wrapping any other failure
pub async fn acquire_until(
    store: &dyn ClimateDataStore,
    request: &AcquisitionRequest,
    deadline: Instant,
    runtime_limit: Duration,
) -> Result<Vec<PathBuf>, WeatherError> {
    tokio::fs::create_dir_all(&request.target_dir)
        .await
        .map_err(|e| WeatherError::Service {
            message: WeatherError::io(&request.target_dir, e).to_string(),
        })?;

    log::debug!("Downloading ERA5 data for {}...", request.aoi_name);

    let mut paths = Vec::new();
    for batch in month_batches(
        *request.months.start(),
        *request.months.end(),
        MAX_MONTHS_PER_BATCH,
    ) {
        log::debug!("Downloading data in months {batch:?}...");
        let fetched = download_months(store, request, batch, deadline)
            .await
            .map_err(|e| match e {
                WeatherError::DeadlineExceeded { .. } => WeatherError::Timeout {
                    limit_minutes: runtime_limit.as_secs_f64() / 60.0,
                },
                other => WeatherError::Service {
                    message: other.to_string(),
                },
            })?;
        paths.extend(fetched);
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Job that becomes ready after a number of polls, or never.
    struct FakeJob {
        polls: AtomicU32,
        ready_after: Option<u32>,
        fail: bool,
    }

    #[async_trait]
    impl RemoteJob for FakeJob {
        async fn is_ready(&self) -> Result<bool, WeatherError> {
            if self.fail {
                return Err(WeatherError::Api {
                    message: "job failed".to_string(),
                });
            }
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(self.ready_after.is_some_and(|after| n >= after))
        }

        async fn download(&self, target: &Path) -> Result<(), WeatherError> {
            std::fs::write(target, b"zip").map_err(|e| WeatherError::io(target, e))
        }
    }

    /// Store that hands out [`FakeJob`]s and records submitted months.
    struct FakeStore {
        ready_after: Option<u32>,
        fail: bool,
        submitted: Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl FakeStore {
        fn new(ready_after: Option<u32>) -> Self {
            Self {
                ready_after,
                fail: false,
                submitted: Arc::new(std::sync::Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl ClimateDataStore for FakeStore {
        async fn submit(
            &self,
            dataset: &str,
            request: &RetrievalRequest,
        ) -> Result<Box<dyn RemoteJob>, WeatherError> {
            assert_eq!(dataset, DATASET);
            self.submitted
                .lock()
                .unwrap()
                .push(request.month[0].clone());
            Ok(Box::new(FakeJob {
                polls: AtomicU32::new(0),
                ready_after: self.ready_after,
                fail: self.fail,
            }))
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("heating_emissions_acquire_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn request(dir: &Path, months: RangeInclusive<u32>) -> AcquisitionRequest {
        AcquisitionRequest {
            aoi_name: "Mühldorf".to_string(),
            area: [48.34, 12.3, 48.22, 12.48],
            year: 2022,
            months,
            target_dir: dir.to_path_buf(),
            poll_interval: Duration::from_millis(5),
        }
    }

    #[test]
    fn batches_of_four() {
        assert_eq!(month_batches(1, 12, 4), vec![1..=4, 5..=8, 9..=12]);
        assert_eq!(month_batches(2, 7, 4), vec![2..=5, 6..=7]);
        assert_eq!(month_batches(3, 3, 4), vec![3..=3]);
        assert!(month_batches(5, 4, 4).is_empty());
    }

    #[test]
    fn archive_name_is_lowercase() {
        let path = archive_path(Path::new("/tmp"), "Heidelberg", 2022, 3);
        assert_eq!(path, PathBuf::from("/tmp/era5_data_heidelberg_2022_3.zip"));
    }

    #[tokio::test]
    async fn downloads_every_month() {
        let dir = temp_dir("all");
        let store = FakeStore::new(Some(2));
        let paths = acquire(&store, &request(&dir, 1..=6), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(paths.len(), 6);
        assert!(paths.iter().all(|p| p.exists()));
        assert_eq!(store.submitted.lock().unwrap().len(), 6);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn cached_months_are_not_submitted() {
        let dir = temp_dir("cached");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(archive_path(&dir, "Mühldorf", 2022, 1), b"zip").unwrap();

        let store = FakeStore::new(Some(1));
        acquire(&store, &request(&dir, 1..=2), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(*store.submitted.lock().unwrap(), vec!["2".to_string()]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn never_ready_job_times_out() {
        let dir = temp_dir("timeout");
        let store = FakeStore::new(None);
        let err = acquire(&store, &request(&dir, 1..=1), Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(matches!(err, WeatherError::Timeout { .. }));
        assert!(err.is_user_error());
        assert!(err.to_string().contains("exceeded the time limit of 0.00 minutes"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn service_failure_is_wrapped() {
        let dir = temp_dir("failure");
        let mut store = FakeStore::new(Some(1));
        store.fail = true;
        let err = acquire(&store, &request(&dir, 1..=1), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, WeatherError::Service { .. }));
        assert!(
            err.to_string()
                .starts_with("ERA5 data download failed by the following exception:\n")
        );
        assert!(err.to_string().contains("job failed"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn poll_stops_at_deadline() {
        let dir = temp_dir("poll");
        std::fs::create_dir_all(&dir).unwrap();
        let target = dir.join("never.zip");
        let job = FakeJob {
            polls: AtomicU32::new(0),
            ready_after: None,
            fail: false,
        };

        let started = Instant::now();
        let err = poll_until_downloaded(
            &job,
            &target,
            started + Duration::from_millis(30),
            Duration::from_millis(5),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, WeatherError::DeadlineExceeded { .. }));
        assert!(job.polls.load(Ordering::SeqCst) >= 2);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
