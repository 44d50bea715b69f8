use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::{error, info, LevelFilter};

use wsd::net;
use wsd::sandbox::Sandbox;

#[derive(Parser)]
#[command(name = "wsd", about = "Static-file HTTP/1.1 server with WebSocket echo")]
struct Args {
    /// Enable debug output
    #[arg(long)]
    debug: bool,

    /// Do not fork child processes
    #[arg(long)]
    no_fork: bool,

    /// Path to static files directory
    #[arg(long, value_name = "path", default_value = "./web")]
    static_files: PathBuf,

    /// Port to listen on
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// IPv4 address to bind
    #[arg(default_value_t = Ipv4Addr::UNSPECIFIED)]
    ip: Ipv4Addr,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // Asking for help isn't an error; everything else exits 1.
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp => 0,
                _ => 1,
            };
            process::exit(code);
        }
    };

    env_logger::Builder::new()
        .filter_level(if args.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();

    let sandbox = match Sandbox::new(&args.static_files) {
        Ok(sandbox) => sandbox,
        Err(e) => {
            error!(
                "can't serve from {}: {}",
                args.static_files.display(),
                e
            );
            process::exit(1);
        }
    };
    info!("using files from directory: {}", sandbox.root().display());

    let config = net::Config {
        addr: args.ip,
        port: args.port,
        use_fork: !args.no_fork,
    };
    if let Err(e) = net::serve(&config, &sandbox) {
        error!("server failed: {}", e);
        process::exit(1);
    }
}
