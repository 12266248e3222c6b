//! Run-forever single-flight memoization for async initializers.
//!
//! Expensive, pure initializations (the dereferenced hyperschema, the parsed
//! resource manifest, the type program) run at most once per process.
//! Concurrent callers during the first in-flight run share its result; a
//! failed first run leaves the cache empty so the next caller retries.
//!
//! # Examples
//!
//! ```
//! use dato_mcp_core::Memo;
//!
//! # async fn example() -> Result<(), std::io::Error> {
//! let memo: Memo<String> = Memo::new();
//!
//! let value = memo
//!     .get_or_try_init(|| async { Ok::<_, std::io::Error>("expensive".to_string()) })
//!     .await?;
//! assert_eq!(value, "expensive");
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use tokio::sync::OnceCell;

/// Single-flight cache over an async initializer.
///
/// A thin wrapper around [`tokio::sync::OnceCell`] that pins down the
/// semantics this workspace relies on: success is cached for the process
/// lifetime, failure is never cached, and at most one initializer runs at a
/// time.
#[derive(Debug)]
pub struct Memo<T> {
    cell: OnceCell<T>,
}

impl<T> Memo<T> {
    /// Creates an empty cache.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
        }
    }

    /// Returns the cached value, running `init` if the cache is empty.
    ///
    /// Callers arriving while an initializer is in flight wait for it; they
    /// only run their own `init` if the in-flight one fails.
    ///
    /// # Errors
    ///
    /// Propagates the initializer's error. The cache stays empty on error.
    pub async fn get_or_try_init<E, F, Fut>(&self, init: F) -> std::result::Result<&T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.cell.get_or_try_init(init).await
    }

    /// Returns the cached value if initialization already succeeded.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_initializer_runs_once() {
        let memo: Memo<u32> = Memo::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = memo
                .get_or_try_init(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, std::convert::Infallible>(42)
                })
                .await
                .unwrap();
            assert_eq!(*value, 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let memo: Memo<u32> = Memo::new();

        let first = memo
            .get_or_try_init(|| async { Err::<u32, _>("boom") })
            .await;
        assert!(first.is_err());

        // The failed run left the cache empty, so the next caller retries.
        let second = memo
            .get_or_try_init(|| async { Ok::<_, &str>(7) })
            .await
            .unwrap();
        assert_eq!(*second, 7);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_run() {
        let memo = Arc::new(Memo::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..8 {
            let memo = Arc::clone(&memo);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                *memo
                    .get_or_try_init(|| async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        Ok::<_, std::convert::Infallible>(99)
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 99);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_before_init() {
        let memo: Memo<u32> = Memo::new();
        assert!(memo.get().is_none());

        memo.get_or_try_init(|| async { Ok::<_, std::convert::Infallible>(1) })
            .await
            .unwrap();
        assert_eq!(memo.get(), Some(&1));
    }
}
