use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::Instrument;

use attest_core::EngineError;

use crate::rpc::{Request, Response, JSONRPC_VERSION};
use crate::session::Session;

/// Drive one session over a newline-delimited JSON-RPC transport.
///
/// Requests dispatch on tasks gated by a FIFO semaphore of size
/// `max_concurrent_requests`; excess requests queue, none are dropped.
/// `submit_plugin_result` bypasses the gate: a full set of batches waiting
/// on plugin verdicts must not be able to queue out their own resolutions.
/// After a `shutdown` response the loop stops reading, drains in-flight
/// work, and returns.
pub async fn run<R, W>(session: Arc<Session>, reader: R, writer: W) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<String>(64);
    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(line) = rx.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err()
                || writer.write_all(b"\n").await.is_err()
                || writer.flush().await.is_err()
            {
                break;
            }
        }
    });

    let semaphore = Arc::new(Semaphore::new(session.limits().max_concurrent_requests));
    let max_frame = session.limits().max_trace_size_bytes;
    let mut reader = BufReader::new(reader);
    let mut in_flight: JoinSet<()> = JoinSet::new();
    let mut line = String::new();

    loop {
        line.clear();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            tracing::info!("client disconnected");
            break;
        }

        if line.len() > max_frame {
            let err = EngineError::InvalidTrace(format!(
                "frame of {} bytes exceeds max_trace_size_bytes {max_frame}",
                line.len()
            ));
            send(&tx, Response::failure(Value::Null, &err)).await;
            continue;
        }

        // Tolerate a UTF-8 BOM and surrounding whitespace.
        let trimmed = line.trim_start_matches('\u{feff}').trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(trimmed) {
            Ok(request) => request,
            Err(e) => {
                let err = EngineError::Internal(format!("malformed request: {e}"));
                send(&tx, Response::failure(Value::Null, &err)).await;
                continue;
            }
        };
        let id = request.id.clone().unwrap_or(Value::Null);
        if request.jsonrpc != JSONRPC_VERSION {
            let err = EngineError::Internal(format!(
                "unsupported jsonrpc version '{}'",
                request.jsonrpc
            ));
            send(&tx, Response::failure(id, &err)).await;
            continue;
        }

        if request.method == "shutdown" {
            let response = match session.dispatch("shutdown", request.params).await {
                Ok(result) => Response::success(id, result),
                Err(err) => Response::failure(id, &err),
            };
            send(&tx, response).await;
            break;
        }

        let gate = (request.method != "submit_plugin_result").then(|| semaphore.clone());
        let session = session.clone();
        let tx = tx.clone();
        in_flight.spawn(async move {
            let _permit = match gate {
                Some(semaphore) => Some(
                    semaphore
                        .acquire_owned()
                        .await
                        .expect("request semaphore never closes"),
                ),
                None => None,
            };
            let timeout = session.request_timeout();
            let span = tracing::debug_span!("rpc", method = %request.method, id = %id);
            tracing::debug!(parent: &span, "dispatching request");
            let dispatch = session
                .dispatch(&request.method, request.params)
                .instrument(span);
            let response =
                match tokio::time::timeout(timeout, dispatch).await
                {
                    Ok(Ok(result)) => Response::success(id, result),
                    Ok(Err(err)) => {
                        tracing::warn!(method = %request.method, error = %err, "request failed");
                        Response::failure(id, &err)
                    }
                    Err(_) => Response::failure(
                        id,
                        &EngineError::Timeout(format!(
                            "request exceeded {} ms",
                            timeout.as_millis()
                        )),
                    ),
                };
            send(&tx, response).await;
        });

        // Reap finished tasks so the set does not grow with session length.
        while in_flight.try_join_next().is_some() {}
    }

    // Drain outstanding work before exiting.
    while in_flight.join_next().await.is_some() {}
    drop(tx);
    let _ = writer_task.await;
    Ok(())
}

async fn send(tx: &mpsc::Sender<String>, response: Response) {
    match serde_json::to_string(&response) {
        Ok(line) => {
            let _ = tx.send(line).await;
        }
        Err(e) => tracing::error!(error = %e, "failed to serialize response"),
    }
}
