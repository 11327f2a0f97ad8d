use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{select, tick, unbounded, Sender};
use tracing::{debug, error, trace};

use crate::Result;

enum Control {
    Reset,
    Stop,
}

/// Background thread invoking a callback at a fixed rate until stopped or the
/// callback returns `false`.
pub(crate) struct FlushTimer {
    control: Sender<Control>,
    handle: Option<JoinHandle<()>>,
}

impl FlushTimer {
    /// Start calling `on_tick` every `interval`, first after one interval elapses.
    /// A panic in `on_tick` is logged and the timer keeps running.
    pub(crate) fn spawn<F>(interval: Duration, mut on_tick: F) -> Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (control_tx, control_rx) = unbounded::<Control>();
        let handle = thread::Builder::new()
            .name("pdu_flush_timer".into())
            .spawn(move || {
                let mut ticker = tick(interval);
                loop {
                    select! {
                        recv(control_rx) -> msg => match msg {
                            Ok(Control::Reset) => {
                                trace!("flush timer reset");
                                ticker = tick(interval);
                            }
                            Ok(Control::Stop) | Err(_) => {
                                debug!("flush timer stopped");
                                break;
                            }
                        },
                        recv(ticker) -> _ => {
                            match catch_unwind(AssertUnwindSafe(&mut on_tick)) {
                                Ok(true) => {}
                                Ok(false) => {
                                    debug!("flush timer target gone");
                                    break;
                                }
                                Err(_) => error!("flush cycle panicked; timer continues"),
                            }
                        },
                    }
                }
            })?;
        debug!(?interval, "flush timer started");
        Ok(FlushTimer {
            control: control_tx,
            handle: Some(handle),
        })
    }

    /// Restart the interval so the next tick is one full interval from now.
    pub(crate) fn reset(&self) {
        let _ = self.control.send(Control::Reset);
    }

    /// Signal the thread to exit and wait for it.
    pub(crate) fn stop(mut self) {
        let _ = self.control.send(Control::Stop);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("flush timer thread panicked");
            }
        }
    }
}

impl Drop for FlushTimer {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Stop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn ticks_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let timer = FlushTimer::spawn(Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::SeqCst);
            true
        })
        .unwrap();
        thread::sleep(Duration::from_millis(100));
        timer.stop();

        let seen = count.load(Ordering::SeqCst);
        assert!(seen > 0);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), seen, "no ticks after stop");
    }

    #[test]
    fn survives_panicking_tick() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let timer = FlushTimer::spawn(Duration::from_millis(5), move || {
            assert!(c.fetch_add(1, Ordering::SeqCst) != 0, "first tick panics");
            true
        })
        .unwrap();
        thread::sleep(Duration::from_millis(100));
        timer.stop();
        assert!(count.load(Ordering::SeqCst) > 1);
    }

    #[test]
    fn exits_when_callback_returns_false() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let timer = FlushTimer::spawn(Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::SeqCst);
            false
        })
        .unwrap();
        thread::sleep(Duration::from_millis(50));
        timer.stop();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_postpones_tick() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let timer = FlushTimer::spawn(Duration::from_millis(300), move || {
            c.fetch_add(1, Ordering::SeqCst);
            true
        })
        .unwrap();
        for _ in 0..5 {
            thread::sleep(Duration::from_millis(100));
            timer.reset();
        }
        assert_eq!(count.load(Ordering::SeqCst), 0, "each reset restarts the interval");

        thread::sleep(Duration::from_millis(500));
        timer.stop();
        assert!(count.load(Ordering::SeqCst) > 0);
    }
}
