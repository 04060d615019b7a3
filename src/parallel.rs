use std::cmp::Reverse;
use std::collections::BTreeMap;

use crossbeam::channel::bounded;
use parking_lot::{Condvar, Mutex};

struct Window {
    /// Items with a sequence number below `limit` may be handed to the consumer
    limit: usize,
    closed: bool,
}

/// Maps items of `iter` with `produce` on `num_threads` workers and passes
/// the results to `consume` in iteration order.
///
/// Items are pulled from `iter` one at a time under a lock, so `iter` may be
/// a stream. At most `2 * num_threads` results are kept ahead of the
/// consumer. If `consume` fails, the workers stop pulling items and the error
/// is returned.
pub fn parallel_process<Iter, Item, Producer, Data, Consumer, Error>(
    iter: Iter,
    num_threads: usize,
    produce: Producer,
    mut consume: Consumer,
) -> Result<(), Error>
where
    Iter: Iterator<Item = Item> + Send,
    Producer: Fn(Item) -> Data + Sync,
    Data: Send,
    Consumer: FnMut(Data) -> Result<(), Error>,
{
    let num_threads = num_threads.max(1);
    let window_size = 2 * num_threads;

    let iter = Mutex::new(iter.enumerate());
    let window = (
        Mutex::new(Window {
            limit: window_size,
            closed: false,
        }),
        Condvar::new(),
    );

    let result = crossbeam::scope(|s| {
        let (sender, receiver) = bounded(window_size);
        for _ in 0..num_threads {
            let sender = sender.clone();
            let (iter, window, produce) = (&iter, &window, &produce);
            s.spawn(move |_| loop {
                let (i, item) = match iter.lock().next() {
                    None => break,
                    Some(x) => x,
                };

                let data = produce(item);

                let (state, cond) = window;
                {
                    let mut guard = state.lock();
                    while !guard.closed && guard.limit <= i {
                        cond.wait(&mut guard);
                    }
                    if guard.closed {
                        break;
                    }
                }

                if sender.send((i, data)).is_err() {
                    break;
                }
            });
        }
        // the receiver ends once all workers dropped their senders
        drop(sender);

        let mut consume_in_order = || -> Result<(), Error> {
            let mut pending = BTreeMap::new();
            let mut next_idx = 0;
            for (i, data) in receiver.iter() {
                pending.insert(Reverse(i), data);
                while let Some(data) = pending.remove(&Reverse(next_idx)) {
                    {
                        let mut guard = window.0.lock();
                        guard.limit += 1;
                        window.1.notify_all();
                    }
                    next_idx += 1;
                    consume(data)?;
                }
            }
            Ok(())
        };
        let result = consume_in_order();

        window.0.lock().closed = true;
        window.1.notify_all();
        drop(receiver);
        result
    });

    match result {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
