use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    let version = env!("CARGO_PKG_VERSION");
    if !args.extended {
        println!("dmxlink {version}");
        return Ok(SUCCESS);
    }

    println!("name: dmxlink");
    println!("version: {version}");
    println!(
        "build_target: {}",
        option_env!("DMXLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("host_os: {}", std::env::consts::OS);
    println!("host_arch: {}", std::env::consts::ARCH);
    println!("link_backend: simulated");
    println!("features: controller={}, cli=true", cfg!(feature = "controller"));

    Ok(SUCCESS)
}
