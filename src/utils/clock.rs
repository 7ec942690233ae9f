use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Utc};
use tokio::time::Instant;

/// Represents an entity responsible for providing dates across application. Tests swap it out to
/// move the tracker between days without waiting for midnight.
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Utc>;

    /// The calendar day the tracker considers "today". Days are local, records are not UTC.
    fn today(&self) -> NaiveDate {
        self.time().with_timezone(&Local).date_naive()
    }

    fn instant(&self) -> Instant;

    async fn sleep_until(&self, instant: Instant);
}

pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, instant: Instant) {
        tokio::time::sleep_until(instant).await;
    }
}

impl DefaultClock {
    pub fn boxed() -> Box<dyn Clock> {
        Box::new(DefaultClock)
    }
}

/// Clock with a date that can be moved by hand. Instants still come from tokio so paused test
/// time keeps working.
#[cfg(test)]
#[derive(Clone)]
pub struct ManualClock {
    today: std::sync::Arc<std::sync::Mutex<NaiveDate>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: std::sync::Arc::new(std::sync::Mutex::new(today)),
        }
    }

    pub fn set_today(&self, today: NaiveDate) {
        *self.today.lock().unwrap() = today;
    }
}

#[cfg(test)]
#[async_trait]
impl Clock for ManualClock {
    fn time(&self) -> DateTime<Utc> {
        let today = *self.today.lock().unwrap();
        today.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, instant: Instant) {
        tokio::time::sleep_until(instant).await;
    }
}
