use std::future::Future;

use tokio::runtime::Handle;

/// Drives an SDK future to completion from synchronous code.
///
/// Inside an entered tokio runtime (see `main`) the future is parked on the
/// runtime's reactor and resumed on wake-up. Without one, it is run on the
/// current thread; that only suits futures which need no tokio driver.
///
/// Must not be called from an async task: blocking a runtime worker panics.
pub fn poll_until_ready<Fut>(future: Fut) -> Fut::Output
where
    Fut: Future,
{
    match Handle::try_current() {
        Ok(handle) => handle.block_on(future),
        Err(_) => futures::executor::block_on(future),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        pin::Pin,
        task::{Context, Poll},
        thread,
        time::Duration,
    };

    use super::*;

    struct PendingTimes {
        remaining: u32,
        value: u32,
    }

    impl Future for PendingTimes {
        type Output = Result<u32, String>;

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            if self.remaining == 0 {
                return Poll::Ready(Ok(self.value));
            }
            self.remaining -= 1;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }

    #[test]
    fn test_poll_until_ready() {
        let cases = vec![(0, 7), (1, 8), (3, 9)];

        for (remaining, value) in cases {
            let result = poll_until_ready(PendingTimes { remaining, value });
            assert_eq!(result, Ok(value), "failed for case: {}", remaining);
        }
    }

    #[test]
    fn test_poll_until_ready_error() {
        let result: Result<(), String> =
            poll_until_ready(futures::future::ready(Err("boom".to_string())));
        assert_eq!(result, Err("boom".to_string()));
    }

    #[test]
    fn test_poll_until_ready_in_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();

        // resolved from another thread; needs the wake-up, not a busy loop
        let (tx, rx) = tokio::sync::oneshot::channel();
        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tx.send(42u32).unwrap();
        });

        assert_eq!(poll_until_ready(rx), Ok(42));
        sender.join().unwrap();

        let timer = poll_until_ready(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            "slept"
        });
        assert_eq!(timer, "slept");
    }
}
