use callpipe_frame::WireVersion;

use crate::cmd::{Context, VersionArgs};
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs, ctx: &Context) -> CliResult<i32> {
    if !args.extended {
        println!("callpipe {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: callpipe");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("CALLPIPE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "build_profile: {}",
        option_env!("CALLPIPE_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "wire_versions: {}, {} (default {})",
        WireVersion::V1,
        WireVersion::V2,
        WireVersion::DEFAULT
    );
    println!("wire_version: {}", ctx.codec.version);
    println!("max_payload: {}", ctx.codec.max_payload_size);
    println!(
        "features: async={}, cli=true",
        cfg!(feature = "async")
    );

    Ok(SUCCESS)
}
