//! Command dispatch.
//!
//! Requests arrive as arrays of bulk strings; the first element names the
//! command. Handlers translate between the wire protocol and the log
//! store / broker APIs, mapping errors onto `-<TYPE> <message>` frames:
//!
//! | TYPE | Meaning |
//! |---|---|
//! | `ARGUMENT` | a well-formed command with an illegal argument |
//! | `COMMAND` | wrong arity or argument type for a known command |
//! | `UNKNOWN_CMD` | command name not in the table |
//! | `PROTOCOL` | malformed framing (handled by the connection loop) |
//! | `ERR` | everything else: unknown names, I/O, closed store, broker |

use bytes::Bytes;
use tracing::debug;

use kuling_protocol::{bulk_header, Frame, CRLF};

use crate::connection::Connection;
use crate::error::Result;
use crate::server::ServerState;

/// A decoded client request.
#[derive(Debug)]
pub struct Request {
    pub command: String,
    pub args: Vec<Frame>,
}

impl Request {
    /// Pull the command name out of a request array.
    pub fn from_frame(frame: Frame) -> std::result::Result<Request, Frame> {
        let items = match frame {
            Frame::Array(Some(items)) if !items.is_empty() => items,
            _ => {
                return Err(Frame::error(
                    "PROTOCOL",
                    "request must be a non-empty array",
                ))
            }
        };

        let mut items = items.into_iter();
        let command = match items.next() {
            Some(Frame::Bulk(Some(name))) => match String::from_utf8(name.to_vec()) {
                Ok(name) => name,
                Err(_) => {
                    return Err(Frame::error("PROTOCOL", "command name must be utf-8"))
                }
            },
            _ => {
                return Err(Frame::error(
                    "PROTOCOL",
                    "command name must be a bulk string",
                ))
            }
        };

        Ok(Request {
            command,
            args: items.collect(),
        })
    }
}

/// Handle one request, writing the response to the connection.
pub async fn dispatch(
    state: &ServerState,
    conn: &mut Connection,
    request: Request,
) -> Result<()> {
    debug!(command = %request.command, args = request.args.len(), "dispatch");

    match request.command.as_str() {
        "PING" => conn.write_frame(&Frame::Simple("PONG".to_string())).await,
        "CREATE" => respond(conn, handle_create(state, &request.args).await).await,
        "LIST" => respond(conn, handle_list(state).await).await,
        "DESCRIBE" => respond(conn, handle_describe(state, &request.args).await).await,
        "DELETE" => respond(conn, handle_delete(state, &request.args).await).await,
        "PUT" => respond(conn, handle_put(state, &request.args).await).await,
        "GET" => handle_get(state, conn, &request.args).await,
        "ITERS" => respond(conn, handle_iters(state, &request.args).await).await,
        "ITER_COMMIT" => respond(conn, handle_iter_commit(state, &request.args).await).await,
        unknown => {
            conn.write_frame(&Frame::error("UNKNOWN_CMD", unknown))
                .await
        }
    }
}

async fn respond(
    conn: &mut Connection,
    reply: std::result::Result<Frame, Frame>,
) -> Result<()> {
    let frame = reply.unwrap_or_else(|err| err);
    conn.write_frame(&frame).await
}

// ---------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------

type Reply = std::result::Result<Frame, Frame>;

async fn handle_create(state: &ServerState, args: &[Frame]) -> Reply {
    expect_arity(args, 2, "CREATE <topic> <num_shards>")?;
    let topic = arg_str(args, 0, "topic")?;
    let num_shards = arg_i64(args, 1, "num_shards")?;
    if num_shards <= 0 || num_shards > u32::MAX as i64 {
        return Err(Frame::error(
            "ARGUMENT",
            format!("num_shards out of range: {num_shards}"),
        ));
    }

    state
        .logs
        .create_topic(&topic, num_shards as u32)
        .await
        .map_err(|err| storage_error_frame(&err))?;
    Ok(ok())
}

async fn handle_list(state: &ServerState) -> Reply {
    let topics = state
        .logs
        .topics()
        .await
        .map_err(|err| storage_error_frame(&err))?;
    Ok(Frame::Array(Some(
        topics
            .into_iter()
            .map(|name| Frame::Bulk(Some(Bytes::from(name))))
            .collect(),
    )))
}

async fn handle_describe(state: &ServerState, args: &[Frame]) -> Reply {
    expect_arity(args, 1, "DESCRIBE <topic>")?;
    let topic = arg_str(args, 0, "topic")?;
    let shards = state
        .logs
        .num_shards(&topic)
        .await
        .map_err(|err| storage_error_frame(&err))?;
    Ok(Frame::Integer(shards as i64))
}

async fn handle_delete(state: &ServerState, args: &[Frame]) -> Reply {
    expect_arity(args, 1, "DELETE <topic>")?;
    let topic = arg_str(args, 0, "topic")?;
    state
        .logs
        .delete_topic(&topic)
        .await
        .map_err(|err| storage_error_frame(&err))?;
    Ok(ok())
}

async fn handle_put(state: &ServerState, args: &[Frame]) -> Reply {
    expect_arity(args, 4, "PUT <topic> <shard> <key> <payload>")?;
    let topic = arg_str(args, 0, "topic")?;
    let shard = arg_str(args, 1, "shard")?;
    let key = arg_bytes(args, 2, "key")?;
    let payload = arg_bytes(args, 3, "payload")?;

    state
        .logs
        .append(&topic, &shard, key, payload)
        .await
        .map_err(|err| storage_error_frame(&err))?;
    Ok(ok())
}

/// GET streams the raw message bytes as one bulk string: the shard's copy
/// path announces the exact byte count, the header goes out, and the
/// segment file is streamed straight into the socket, then the trailer.
async fn handle_get(state: &ServerState, conn: &mut Connection, args: &[Frame]) -> Result<()> {
    let parsed = (|| {
        expect_arity(args, 4, "GET <topic> <shard> <start_seq> <max_messages>")?;
        let topic = arg_str(args, 0, "topic")?;
        let shard = arg_str(args, 1, "shard")?;
        let start_seq = arg_i64(args, 2, "start_seq")?;
        let max = arg_i64(args, 3, "max_messages")?;
        Ok::<_, Frame>((topic, shard, start_seq, max))
    })();
    let (topic, shard, start_seq, max) = match parsed {
        Ok(parsed) => parsed,
        Err(err) => return conn.write_frame(&err).await,
    };

    let result = state
        .logs
        .copy(
            &topic,
            &shard,
            start_seq,
            max,
            conn.sink(),
            |total| bulk_header(total),
            |_| Bytes::from_static(CRLF),
        )
        .await;

    match result {
        Ok(_) => conn.flush().await,
        // Range planning fails before any byte is written, so an error
        // frame is still well-formed on the wire.
        Err(err) => conn.write_frame(&storage_error_frame(&err)).await,
    }
}

async fn handle_iters(state: &ServerState, args: &[Frame]) -> Reply {
    expect_arity(args, 3, "ITERS <group> <client> <topic>")?;
    let group = arg_str(args, 0, "group")?;
    let client = arg_str(args, 1, "client")?;
    let topic = arg_str(args, 2, "topic")?;

    let iters = state
        .broker
        .iters(&group, &client, &topic)
        .await
        .map_err(|err| broker_error_frame(&err))?;
    Ok(Frame::Array(Some(
        iters
            .into_iter()
            .map(|iter| Frame::Bulk(Some(Bytes::from(iter))))
            .collect(),
    )))
}

async fn handle_iter_commit(state: &ServerState, args: &[Frame]) -> Reply {
    expect_arity(args, 2, "ITER_COMMIT <iterator> <offset>")?;
    let iter = arg_str(args, 0, "iterator")?;
    let offset = arg_i64(args, 1, "offset")?;

    state
        .broker
        .commit(&iter, offset)
        .await
        .map_err(|err| broker_error_frame(&err))?;
    Ok(ok())
}

// ---------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------

fn ok() -> Frame {
    Frame::Simple("OK".to_string())
}

fn expect_arity(args: &[Frame], want: usize, usage: &str) -> std::result::Result<(), Frame> {
    if args.len() != want {
        return Err(Frame::error(
            "COMMAND",
            format!("wrong number of arguments, usage: {usage}"),
        ));
    }
    Ok(())
}

fn arg_bytes(args: &[Frame], i: usize, name: &str) -> std::result::Result<Bytes, Frame> {
    match args.get(i) {
        Some(Frame::Bulk(Some(data))) => Ok(data.clone()),
        _ => Err(Frame::error(
            "COMMAND",
            format!("{name} must be a bulk string"),
        )),
    }
}

fn arg_str(args: &[Frame], i: usize, name: &str) -> std::result::Result<String, Frame> {
    let data = arg_bytes(args, i, name)?;
    String::from_utf8(data.to_vec())
        .map_err(|_| Frame::error("COMMAND", format!("{name} must be utf-8")))
}

fn arg_i64(args: &[Frame], i: usize, name: &str) -> std::result::Result<i64, Frame> {
    match args.get(i) {
        Some(frame) => frame
            .as_integer()
            .ok_or_else(|| Frame::error("COMMAND", format!("{name} must be an integer"))),
        None => Err(Frame::error("COMMAND", format!("{name} missing"))),
    }
}

// ---------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------

fn storage_error_frame(err: &kuling_storage::Error) -> Frame {
    use kuling_storage::Error as E;
    match err {
        E::IllegalArgument(_) | E::NegativeOffset(_) | E::InvalidConfig(_) => {
            Frame::error("ARGUMENT", err.to_string())
        }
        _ => Frame::error("ERR", err.to_string()),
    }
}

fn broker_error_frame(err: &kuling_broker::Error) -> Frame {
    use kuling_broker::Error as E;
    match err {
        E::IllegalArgument(_) | E::InvalidIterator(_) => {
            Frame::error("ARGUMENT", err.to_string())
        }
        E::Store(inner) => storage_error_frame(inner),
        _ => Frame::error("ERR", err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_frame() {
        let frame = Frame::command(["PUT", "t", "0", "k", "v"]);
        let request = Request::from_frame(frame).unwrap();
        assert_eq!(request.command, "PUT");
        assert_eq!(request.args.len(), 4);
    }

    #[test]
    fn test_request_rejects_empty_array() {
        assert!(Request::from_frame(Frame::Array(Some(vec![]))).is_err());
        assert!(Request::from_frame(Frame::Array(None)).is_err());
        assert!(Request::from_frame(Frame::Integer(3)).is_err());
    }

    #[test]
    fn test_request_rejects_non_bulk_name() {
        let frame = Frame::Array(Some(vec![Frame::Integer(1)]));
        let err = Request::from_frame(frame).unwrap_err();
        assert_eq!(err.error_parts().unwrap().0, "PROTOCOL");
    }

    #[test]
    fn test_arity_check() {
        let args = vec![Frame::Bulk(Some(Bytes::from("t")))];
        let err = expect_arity(&args, 2, "CREATE <topic> <num_shards>").unwrap_err();
        let (kind, msg) = err.error_parts().unwrap();
        assert_eq!(kind, "COMMAND");
        assert!(msg.contains("CREATE"));
    }

    #[test]
    fn test_arg_i64_accepts_bulk_digits() {
        let args = vec![Frame::Bulk(Some(Bytes::from("17")))];
        assert_eq!(arg_i64(&args, 0, "n").unwrap(), 17);

        let args = vec![Frame::Integer(17)];
        assert_eq!(arg_i64(&args, 0, "n").unwrap(), 17);

        let args = vec![Frame::Bulk(Some(Bytes::from("nope")))];
        assert!(arg_i64(&args, 0, "n").is_err());
    }

    #[test]
    fn test_storage_error_mapping() {
        let err = kuling_storage::Error::IllegalArgument("empty key".to_string());
        assert_eq!(storage_error_frame(&err).error_parts().unwrap().0, "ARGUMENT");

        let err = kuling_storage::Error::UnknownTopic("t".to_string());
        assert_eq!(storage_error_frame(&err).error_parts().unwrap().0, "ERR");

        let err = kuling_storage::Error::Closed;
        assert_eq!(storage_error_frame(&err).error_parts().unwrap().0, "ERR");
    }

    #[test]
    fn test_broker_error_mapping() {
        let err = kuling_broker::Error::UnknownIterator("g/t/0".to_string());
        assert_eq!(broker_error_frame(&err).error_parts().unwrap().0, "ERR");

        let err = kuling_broker::Error::IllegalArgument("negative offset".to_string());
        assert_eq!(broker_error_frame(&err).error_parts().unwrap().0, "ARGUMENT");

        let err =
            kuling_broker::Error::Store(kuling_storage::Error::UnknownTopic("t".to_string()));
        assert_eq!(broker_error_frame(&err).error_parts().unwrap().0, "ERR");
    }
}
