use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use etherbone_server::config::{parse_number, ErrorPolicy};
use etherbone_server::error::Result;
use etherbone_server::{Config, MappedRegion, MemoryAccess, RamRegion, Server};
use tracing::{error, info};

/// EtherBone responder serving a physical memory window over UDP.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Base physical address of memory connected to PL (default: 0x400000000)
    #[arg(long, value_parser = parse_number)]
    pl_mem_base: Option<u64>,

    /// Size of the PL memory area (default: 0x100000000)
    #[arg(long, value_parser = parse_number)]
    pl_mem_size: Option<u64>,

    /// UDP port to use (default: 1234)
    #[arg(long, value_parser = parse_port)]
    udp_port: Option<u16>,

    /// Size of internal server buffer (default: 4096)
    #[arg(long, value_parser = parse_number)]
    server_buf_size: Option<u64>,

    /// Abort on EtherBone packet errors
    #[arg(long)]
    etherbone_abort: bool,

    /// JSON configuration file; command line options override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serve a zeroed in-process buffer instead of mapping /dev/mem
    #[arg(long)]
    emulate: bool,
}

fn parse_port(s: &str) -> std::result::Result<u16, String> {
    let port = parse_number(s)?;
    u16::try_from(port).map_err(|_| format!("Port {} out of range", port))
}

impl Args {
    fn to_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };

        if let Some(base) = self.pl_mem_base {
            config.mem_base = base;
        }
        if let Some(size) = self.pl_mem_size {
            config.mem_size = size;
        }
        if let Some(port) = self.udp_port {
            config.udp_port = port;
        }
        if let Some(size) = self.server_buf_size {
            config.buffer_size = usize::try_from(size).map_err(|_| {
                etherbone_server::EtherboneError::Config(format!("Buffer size {} too large", size))
            })?;
        }
        if self.etherbone_abort {
            config.policy = ErrorPolicy::Abort;
        }

        config.validate()?;
        Ok(config)
    }
}

async fn serve(args: Args) -> Result<()> {
    let config = args.to_config()?;

    let memory: Box<dyn MemoryAccess> = if args.emulate {
        info!("Emulating 0x{:x} bytes of memory", config.mem_size);
        Box::new(RamRegion::new(config.mem_size as usize))
    } else {
        Box::new(MappedRegion::open(config.mem_base, config.mem_size)?)
    };

    let mut server = Server::bind(config, memory).await?;
    Err(server.run().await)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match serve(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            error!("Aborting");
            ExitCode::FAILURE
        }
    }
}
