use std::future::Future;

use chrono::Utc;
use rand::Rng;

use crate::{
    domain::OrderCode,
    error::{AppError, Result},
};

/// Mints order codes as `unix_millis * 100 + random(0..100)`.
///
/// Uniqueness is not trusted to the random draw: the store holds a unique
/// index on `order_code`, and [`OrderCodeGenerator::with_fresh_code`] retries
/// the whole write with a new code when that index rejects it.
#[derive(Debug, Clone)]
pub struct OrderCodeGenerator {
    max_attempts: usize,
}

impl OrderCodeGenerator {
    pub const DEFAULT_ATTEMPTS: usize = 5;

    pub fn new() -> Self {
        Self {
            max_attempts: Self::DEFAULT_ATTEMPTS,
        }
    }

    pub fn next_code(&self) -> Result<OrderCode> {
        let millis = Utc::now().timestamp_millis();
        let suffix: i64 = rand::thread_rng().gen_range(0..100);

        millis
            .checked_mul(100)
            .and_then(|base| base.checked_add(suffix))
            .and_then(OrderCode::new)
            .ok_or_else(|| AppError::Internal("Clock out of order-code range".to_string()))
    }

    /// Runs `write` with a fresh code, regenerating on `DuplicateOrderCode`.
    pub async fn with_fresh_code<T, F, Fut>(&self, mut write: F) -> Result<T>
    where
        F: FnMut(OrderCode) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_collision = None;

        for attempt in 1..=self.max_attempts {
            let code = self.next_code()?;
            match write(code).await {
                Err(AppError::DuplicateOrderCode(taken)) => {
                    tracing::warn!("Order code {} already taken (attempt {})", taken, attempt);
                    last_collision = Some(taken);
                }
                other => return other,
            }
        }

        Err(AppError::DuplicateOrderCode(last_collision.unwrap_or_default()))
    }
}

impl Default for OrderCodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn codes_are_positive_and_time_ordered() {
        let generator = OrderCodeGenerator::new();
        let first = generator.next_code().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = generator.next_code().unwrap();

        assert!(first.get() > 0);
        assert!(second > first);
        assert!(second.get() <= OrderCode::MAX);
    }

    #[tokio::test]
    async fn retries_with_new_code_after_collision() {
        let generator = OrderCodeGenerator::new();
        let calls = AtomicUsize::new(0);

        let result = generator
            .with_fresh_code(|code| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AppError::DuplicateOrderCode(code.get()))
                    } else {
                        Ok(code)
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let generator = OrderCodeGenerator::new();
        let calls = AtomicUsize::new(0);

        let result: Result<()> = generator
            .with_fresh_code(|code| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(AppError::DuplicateOrderCode(code.get())) }
            })
            .await;

        assert!(matches!(result, Err(AppError::DuplicateOrderCode(_))));
        assert_eq!(calls.load(Ordering::SeqCst), OrderCodeGenerator::DEFAULT_ATTEMPTS);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let generator = OrderCodeGenerator::new();
        let calls = AtomicUsize::new(0);

        let result: Result<()> = generator
            .with_fresh_code(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::Conflict("taken".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
