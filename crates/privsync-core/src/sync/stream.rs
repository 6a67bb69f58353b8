//! Change-notification streams built on [`Variable`] subscriptions.
//!
//! Every stream yields the current value first and then one item per actual
//! change of the projected value, in publication order. Changes that leave
//! the projection equal (another field of the bundle moved) are swallowed.
//! A stream ends once its variable is gone.
//!
//! [`Variable`]: super::variable::Variable

use async_stream::stream;
use futures::Stream;

use super::variable::Subscription;

/// Projects a subscribed value through `map` and yields distinct results.
pub fn distinct<S, T, F>(mut updates: Subscription<S>, map: F) -> impl Stream<Item = T>
where
    S: Clone,
    F: Fn(&S) -> T,
    T: Clone + PartialEq,
{
    stream! {
        let mut last = map(updates.current());
        yield last.clone();

        while let Some(value) = updates.recv().await {
            let next = map(&value);
            if next != last {
                last = next.clone();
                yield next;
            }
        }
    }
}

/// Combines two subscribed values through `merge`, re-evaluating after each
/// change of either input, and yields distinct results.
pub fn combine<A, B, T, F>(
    mut left: Subscription<A>,
    mut right: Subscription<B>,
    merge: F,
) -> impl Stream<Item = T>
where
    A: Clone,
    B: Clone,
    F: Fn(&A, &B) -> T,
    T: Clone + PartialEq,
{
    stream! {
        let mut last = merge(left.current(), right.current());
        yield last.clone();

        loop {
            let changed = tokio::select! {
                value = left.recv() => value.is_some(),
                value = right.recv() => value.is_some(),
            };
            if !changed {
                break;
            }

            let next = merge(left.current(), right.current());
            if next != last {
                last = next.clone();
                yield next;
            }
        }
    }
}

/// Yields `()` each time `predicate` turns from false to true.
pub fn rising_edges<S, F>(updates: Subscription<S>, predicate: F) -> impl Stream<Item = ()>
where
    S: Clone,
    F: Fn(&S) -> bool,
{
    let values = distinct(updates, predicate);
    stream! {
        futures::pin_mut!(values);
        while let Some(active) = futures::StreamExt::next(&mut values).await {
            if active {
                yield ();
            }
        }
    }
}
