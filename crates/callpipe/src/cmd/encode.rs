use callpipe_frame::{FrameCodec, Value, MAX_ARGS};
use callpipe_pipe::{CallChannel, StdioPipe};
use tracing::{debug, warn};

use crate::cmd::{Context, EncodeArgs};
use crate::convert::parse_arg;
use crate::exit::{frame_error, pipe_error, CliResult, SUCCESS};

pub fn run(args: EncodeArgs, ctx: &Context) -> CliResult<i32> {
    if args.args.len() > MAX_ARGS {
        warn!(
            given = args.args.len(),
            "only the first {MAX_ARGS} arguments are encoded"
        );
    }
    let values: Vec<Value> = args.args.iter().map(|raw| parse_arg(raw)).collect();

    if args.hex {
        let frame = FrameCodec::new(ctx.codec)
            .serialize(&args.name, &values)
            .map_err(|err| frame_error("encode failed", err))?;
        debug!(call = %args.name, bytes = frame.len(), "encoded frame");
        println!("{}", hex::encode(&frame));
        return Ok(SUCCESS);
    }

    let channel = CallChannel::with_config(StdioPipe::stdio(), ctx.codec);
    let written = channel
        .send(&args.name, &values)
        .map_err(|err| pipe_error("encode failed", err))?;
    debug!(call = %args.name, bytes = written, "wrote frame");
    Ok(SUCCESS)
}
