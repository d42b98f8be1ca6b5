//! Timer-driven behaviors.
//!
//! Timers are producer behaviors backed by a tokio task. The task is only
//! spawned while the behavior has listeners or pullers, and it runs on the
//! current [`tokio::task::LocalSet`] because behaviors are not `Send`.

use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::behavior::{producer_behavior, Behavior, Pusher};

/// A behavior counting the ticks of a timer with the given `period`.
///
/// The count starts at zero each time the timer starts, and holds its last
/// value while stopped.
///
/// # Panics
///
/// Starting the timer (by subscribing or pulling) panics outside a
/// `LocalSet`.
pub fn interval(period: Duration) -> Behavior<u64> {
    producer_behavior(
        move |push: Pusher<u64>| {
            tracing::debug!(?period, "starting interval timer");
            let task = tokio::task::spawn_local(async move {
                let mut timer = interval_at(Instant::now() + period, period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                let mut ticks = 0u64;
                loop {
                    timer.tick().await;
                    ticks += 1;
                    push.push(ticks);
                }
            });
            move || {
                tracing::debug!(?period, "stopping interval timer");
                task.abort();
            }
        },
        0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tokio::task::LocalSet;

    #[tokio::test(start_paused = true)]
    async fn interval_ticks_while_observed() {
        LocalSet::new()
            .run_until(async {
                let ticks = interval(Duration::from_millis(10));
                let seen = Rc::new(RefCell::new(Vec::new()));
                let seen_clone = seen.clone();
                let handle = ticks.subscribe(move |n| seen_clone.borrow_mut().push(n));

                tokio::time::sleep(Duration::from_millis(35)).await;
                assert_eq!(*seen.borrow(), vec![1, 2, 3]);
                assert_eq!(ticks.at(), 3);

                drop(handle);
                tokio::time::sleep(Duration::from_millis(50)).await;
                assert_eq!(ticks.at(), 3);
                assert_eq!(seen.borrow().len(), 3);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn pulling_also_runs_the_timer() {
        LocalSet::new()
            .run_until(async {
                let ticks = interval(Duration::from_millis(10));
                ticks.change_pullers(1);
                tokio::time::sleep(Duration::from_millis(25)).await;
                assert_eq!(ticks.at(), 2);
                ticks.change_pullers(-1);
            })
            .await;
    }
}
