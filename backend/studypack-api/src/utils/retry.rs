use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(500),
            jitter_max: Some(Duration::from_millis(50)),
        }
    }
}

impl RetryConfig {
    /// Waiting for another instance to finish generating for the same material.
    /// Roughly a minute in total before giving up.
    pub fn lock_acquisition() -> Self {
        Self {
            max_attempts: 60,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            jitter_max: Some(Duration::from_millis(100)),
        }
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        std::cmp::min(current * 2, self.max_backoff)
    }

    fn jitter(&self) -> Duration {
        match self.jitter_max {
            Some(jitter_max) if !jitter_max.is_zero() => {
                let jitter_ms = jitter_max.as_millis() as u64;
                Duration::from_millis(rand::random::<u64>() % (jitter_ms + 1))
            }
            _ => Duration::ZERO,
        }
    }
}

pub async fn retry_async_with_config<F, Fut, T, E>(config: RetryConfig, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempts_left = config.max_attempts;
    let mut backoff = config.base_backoff;

    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempts_left = attempts_left.saturating_sub(1);
                if attempts_left == 0 {
                    return Err(e);
                }

                tokio::time::sleep(backoff + config.jitter()).await;
                backoff = config.next_backoff(backoff);
            }
        }
    }
}
