use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};

use crate::reactive::EventStream;

/// Zips two streams, always pairing the latest unpaired value from each side.
///
/// For example:
///
/// ```text
/// left   ---- 1 ----- 2 ---------------- 3 ------
/// right  -------------------- a --- b ------------
/// result ----------------- (2, a) ------ (3, b) --
/// ```
///
/// An arrival overwrites its side's slot; when the other slot also holds a
/// value, the pair is emitted and both slots are cleared in the same poll
/// step, so no value ever appears in two pairs. Either side's fault or
/// completion ends the combined stream immediately, pending slot or not.
pub struct ZipLatest<T1, T2> {
    left: EventStream<T1>,
    right: EventStream<T2>,
    left_slot: Option<T1>,
    right_slot: Option<T2>,
    done: bool,
}

// Slots are only ever moved out through &mut access; nothing is pinned
// through them.
impl<T1, T2> Unpin for ZipLatest<T1, T2> {}

impl<T1, T2> ZipLatest<T1, T2>
where
    T1: Send + 'static,
    T2: Send + 'static,
{
    pub fn new(left: EventStream<T1>, right: EventStream<T2>) -> Self {
        Self {
            left,
            right,
            left_slot: None,
            right_slot: None,
            done: false,
        }
    }
}

impl<T1, T2> Stream for ZipLatest<T1, T2>
where
    T1: Send + 'static,
    T2: Send + 'static,
{
    type Item = anyhow::Result<(T1, T2)>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        loop {
            let mut progressed = false;

            match this.left.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(value))) => {
                    progressed = true;
                    if let Some(paired) = this.right_slot.take() {
                        this.left_slot = None;
                        return Poll::Ready(Some(Ok((value, paired))));
                    }
                    this.left_slot = Some(value);
                }
                Poll::Ready(Some(Err(fault))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(fault)));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => {}
            }

            match this.right.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(value))) => {
                    progressed = true;
                    if let Some(paired) = this.left_slot.take() {
                        this.right_slot = None;
                        return Poll::Ready(Some(Ok((paired, value))));
                    }
                    this.right_slot = Some(value);
                }
                Poll::Ready(Some(Err(fault))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(fault)));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => {}
            }

            if !progressed {
                return Poll::Pending;
            }
        }
    }
}

/// Boxes a [`ZipLatest`] over two [`EventStream`]s.
pub fn zip_latest<T1, T2>(left: EventStream<T1>, right: EventStream<T2>) -> EventStream<(T1, T2)>
where
    T1: Send + 'static,
    T2: Send + 'static,
{
    ZipLatest::new(left, right).boxed()
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use futures::FutureExt;
    use futures::StreamExt;

    use super::*;
    use crate::reactive::push_stream;

    #[tokio::test]
    async fn pairs_the_latest_unpaired_values() {
        let (left, left_stream) = push_stream::<i32>();
        let (right, right_stream) = push_stream::<&'static str>();
        let mut zipped = zip_latest(left_stream, right_stream);

        // A=1, A=2: the 1 is overwritten before any pairing happens.
        left.push(1);
        left.push(2);
        assert!(zipped.next().now_or_never().is_none());

        right.push("x");
        assert_eq!(zipped.next().await.unwrap().unwrap(), (2, "x"));

        left.push(3);
        assert!(zipped.next().now_or_never().is_none());

        right.push("y");
        assert_eq!(zipped.next().await.unwrap().unwrap(), (3, "y"));
    }

    #[tokio::test]
    async fn completion_of_either_side_ends_the_pair_stream() {
        let (left, left_stream) = push_stream::<i32>();
        let (right, right_stream) = push_stream::<i32>();
        let mut zipped = zip_latest(left_stream, right_stream);

        left.push(1);
        assert!(zipped.next().now_or_never().is_none());

        // Completion is not deferred until the pending slot is consumed.
        right.complete();
        assert!(zipped.next().await.is_none());
    }

    #[tokio::test]
    async fn fault_of_either_side_propagates_immediately() {
        let (left, left_stream) = push_stream::<i32>();
        let (right, right_stream) = push_stream::<i32>();
        let mut zipped = zip_latest(left_stream, right_stream);

        left.push(1);
        assert!(zipped.next().now_or_never().is_none());

        right.error(anyhow!("venue down"));
        assert!(zipped.next().await.unwrap().is_err());
        assert!(zipped.next().await.is_none());
    }

    #[tokio::test]
    async fn survives_concurrent_pushers() {
        let (left, left_stream) = push_stream::<u32>();
        let (right, right_stream) = push_stream::<u32>();
        let mut zipped = zip_latest(left_stream, right_stream);

        let push_left = std::thread::spawn(move || {
            for i in 0..1000 {
                left.push(i);
            }
            left.complete();
        });
        let push_right = std::thread::spawn(move || {
            for i in 0..1000 {
                right.push(i);
            }
            right.complete();
        });

        // Every emitted pair must consume fresh values on both sides: the
        // components are strictly increasing, no value is paired twice.
        let mut last_left = -1i64;
        let mut last_right = -1i64;
        while let Some(item) = zipped.next().await {
            let (l, r) = item.unwrap();
            assert!(i64::from(l) > last_left);
            assert!(i64::from(r) > last_right);
            last_left = i64::from(l);
            last_right = i64::from(r);
        }

        push_left.join().unwrap();
        push_right.join().unwrap();
    }
}
