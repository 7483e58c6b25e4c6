//! Building one frame tree from many chunks of records on several threads.

use crossbeam_channel as channel;

use crate::error::{Error, Result};
use crate::record::Record;

use super::{Frame, FrameTreeBuilder, Options};

/// Builds a tree from `chunks` using up to [`Options::nthreads`] worker threads.
///
/// Each worker merges whole chunks into a private tree; the private trees are combined once all
/// workers have finished, so the result is identical to a single-threaded build over the same
/// records in any order. The first failing record stops all workers and its error is returned.
pub fn build_chunks<C>(opt: &Options, chunks: &[C]) -> Result<Frame>
where
    C: AsRef<[Record]> + Sync,
{
    let nthreads = std::cmp::min(opt.nthreads, chunks.len());
    if nthreads <= 1 {
        return FrameTreeBuilder::from_records(opt.clone(), chunks.iter().flat_map(|c| c.as_ref()));
    }
    debug!(
        "Building frame tree from {} chunks on {} threads",
        chunks.len(),
        nthreads
    );

    crossbeam_utils::thread::scope(|scope| {
        // At most one worker error reaches the main thread.
        let (tx_error, rx_error) = channel::bounded::<Error>(1);

        // `None` tells a worker there is no more input.
        let (tx_input, rx_input) = channel::bounded::<Option<&[Record]>>(2 * nthreads);

        // A failing worker tells the others to give up.
        let (tx_stop, rx_stop) = channel::bounded::<()>(nthreads - 1);

        let mut handles = Vec::with_capacity(nthreads);
        for _ in 0..nthreads {
            let tx_error = tx_error.clone();
            let rx_input = rx_input.clone();
            let (tx_stop, rx_stop) = (tx_stop.clone(), rx_stop.clone());
            let mut builder = FrameTreeBuilder::from(opt.clone());

            let handle = scope.spawn(move |_| loop {
                channel::select! {
                    recv(rx_input) -> input => {
                        let chunk = match input {
                            Ok(Some(chunk)) => chunk,
                            Ok(None) | Err(_) => return Some(builder.build()),
                        };
                        for record in chunk {
                            if let Err(e) = builder.on_record(record) {
                                // a full stop channel means another worker already failed
                                for _ in 0..(nthreads - 1) {
                                    let _ = tx_stop.try_send(());
                                }
                                let _ = tx_error.try_send(e);
                                return None;
                            }
                        }
                    },
                    recv(rx_stop) -> _ => return None,
                }
            });
            handles.push(handle);
        }

        // Sends fail once every worker has stopped.
        drop(rx_input);

        for chunk in chunks {
            if tx_input.send(Some(chunk.as_ref())).is_err() {
                break;
            }
        }
        for _ in &handles {
            if tx_input.send(None).is_err() {
                break;
            }
        }

        drop(tx_error);
        let mut maybe_error = rx_error.iter().next();

        let mut root = Frame::root();
        for handle in handles {
            if let Some(tree) = handle.join().unwrap() {
                if root.can_absorb(tree.total_samples(), tree.total_weight()) {
                    root.combine(tree);
                } else if maybe_error.is_none() {
                    maybe_error = Some(Error::CounterOverflow);
                }
            }
        }

        match maybe_error {
            Some(e) => Err(e),
            None => Ok(root),
        }
    })
    .unwrap()
}
