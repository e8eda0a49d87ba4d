use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs::File;
use std::io;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use callpipe_frame::{Decoded, FrameCodec};
use callpipe_pipe::{CallChannel, DelegatePipe, LinePipe, PipeNode, StdioPipe};
use callpipe_transport::{EndpointPoll, StreamEndpoint, Transport};
use tracing::{debug, info};

use crate::cmd::{Context, DecodeArgs};
use crate::exit::{
    frame_error, io_error, pipe_error, transport_error, CliError, CliResult, DATA_INVALID, SUCCESS,
};
use crate::output::CallPrinter;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: DecodeArgs, ctx: &Context) -> CliResult<i32> {
    let source = Source::open(args.input.as_deref())?;
    let mut printer = CallPrinter::new(ctx.format);

    let result = if args.lines {
        decode_lines(&source, ctx, &mut printer)
    } else {
        decode_frames(&source, ctx, &mut printer)
    };

    let decoded = printer.count();
    printer.finish();
    result?;

    info!(calls = decoded, "decode complete");
    Ok(SUCCESS)
}

/// Where input bytes come from: the stdio bridge, or a file read on a
/// background thread and relayed through a delegate pipe.
enum Source {
    Stdin(StdioPipe<io::Stdin, io::Stdout>),
    File {
        transport: Transport,
        pipe: DelegatePipe,
    },
}

impl Source {
    fn open(input: Option<&Path>) -> CliResult<Self> {
        let Some(path) = input else {
            return Ok(Self::Stdin(StdioPipe::stdio()));
        };

        let file = File::open(path)
            .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))?;
        let endpoint = StreamEndpoint::spawn(file, io::sink())
            .map_err(|err| transport_error("failed starting reader", err))?;
        let transport = Transport::new(endpoint);
        let pipe = DelegatePipe::bind(transport.clone())
            .map_err(|err| pipe_error("failed binding input", err))?;
        debug!(path = %path.display(), "reading frames from file");
        Ok(Self::File { transport, pipe })
    }

    fn node(&self) -> &PipeNode {
        match self {
            Self::Stdin(pipe) => pipe.node(),
            Self::File { pipe, .. } => pipe.node(),
        }
    }

    /// Deliver the next input to the node. Returns false at end of input.
    fn advance(&self) -> CliResult<bool> {
        match self {
            Self::Stdin(pipe) => pipe
                .poll()
                .map_err(|err| pipe_error("failed reading stdin", err)),
            Self::File { transport, .. } => loop {
                let polled = transport
                    .poll(Some(POLL_INTERVAL))
                    .map_err(|err| transport_error("failed reading input", err))?;
                match polled {
                    EndpointPoll::Ready(_) => return Ok(true),
                    EndpointPoll::Eof => return Ok(false),
                    EndpointPoll::Idle => continue,
                }
            },
        }
    }
}

fn decode_frames(source: &Source, ctx: &Context, printer: &mut CallPrinter) -> CliResult<()> {
    let channel = CallChannel::with_config(source.node(), ctx.codec);

    while source.advance()? {
        channel
            .drain(|call| printer.print(&call))
            .map_err(|err| pipe_error("decode failed", err))?;
    }
    channel
        .drain(|call| printer.print(&call))
        .map_err(|err| pipe_error("decode failed", err))?;

    let leftover = source.node().buffered_len();
    if leftover > 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!("input ended inside a frame ({leftover} bytes buffered)"),
        ));
    }
    Ok(())
}

fn decode_lines(source: &Source, ctx: &Context, printer: &mut CallPrinter) -> CliResult<()> {
    let lines = LinePipe::new();
    source
        .node()
        .attach_sink(lines.node())
        .map_err(|err| pipe_error("failed linking line splitter", err))?;

    let queue: Rc<RefCell<VecDeque<Bytes>>> = Rc::default();
    let pending = Rc::clone(&queue);
    lines.on_line(move |line| pending.borrow_mut().push_back(line.clone()));

    let codec = FrameCodec::new(ctx.codec);
    let mut line_no = 0usize;
    loop {
        let more = source.advance()?;
        // Lines are taken from the splitter; the raw copy is not needed.
        source.node().clear_buffer();

        loop {
            let next = queue.borrow_mut().pop_front();
            let Some(line) = next else {
                break;
            };
            line_no += 1;
            decode_hex_line(&codec, &line, line_no, printer)?;
        }

        if !more {
            break;
        }
    }

    let tail = lines.node().with_buffer(|buf| buf.split().freeze());
    if !tail.is_empty() {
        decode_hex_line(&codec, &tail, line_no + 1, printer)?;
    }
    Ok(())
}

fn decode_hex_line(
    codec: &FrameCodec,
    line: &[u8],
    line_no: usize,
    printer: &mut CallPrinter,
) -> CliResult<()> {
    let text = std::str::from_utf8(line)
        .map_err(|_| CliError::new(DATA_INVALID, format!("line {line_no}: not UTF-8")))?
        .trim();
    if text.is_empty() {
        return Ok(());
    }

    let raw = hex::decode(text)
        .map_err(|err| CliError::new(DATA_INVALID, format!("line {line_no}: {err}")))?;
    let mut buf = BytesMut::from(&raw[..]);
    while !buf.is_empty() {
        let decoded = codec
            .deserialize(&mut buf)
            .map_err(|err| frame_error(&format!("line {line_no}"), err))?;
        match decoded {
            Decoded::Call(call) => printer.print(&call),
            Decoded::NoOp => {}
            Decoded::Incomplete => {
                return Err(CliError::new(
                    DATA_INVALID,
                    format!("line {line_no}: incomplete frame ({} bytes)", buf.len()),
                ));
            }
        }
    }
    Ok(())
}
