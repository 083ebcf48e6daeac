use anyhow::{Context, Result};
use clap::Parser;
use log;
use std::net::{Ipv4Addr, TcpListener};
use std::path::PathBuf;
use tcp_adapter::{
    adapter::Adapter,
    config::{AdapterConfig, Settings},
    l2_l3::ethernet::EthernetReceiver,
    oracle::{JsonLinesOracle, MemoryOracle, OracleSink},
    sender::{interface_ipv4, RawSocketSender},
    server,
    tracker::{Tracker, CAPTURE_READ_TIMEOUT},
    translator::ProcessTranslator,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(after_help = "EXAMPLES: ./tcp_adapter -c adapter.yaml -i d0 --imp-address 172.20.10.110 --imp-port 2000")]
struct Args {
    #[arg(long, short = 'c', help = "YAML file with an `adapter:` section")]
    config: Option<PathBuf>,

    #[arg(long, short = 'i', help = "Interface facing the implementation, e.g., eth0")]
    iface: Option<String>,

    #[arg(long, help = "IPv4 address of the implementation under test, e.g., 172.20.10.110")]
    imp_address: Option<Ipv4Addr>,

    #[arg(long, help = "Tcp port of the implementation under test, e.g., 2000")]
    imp_port: Option<u16>,

    #[arg(long, short = 'p', help = "Control port to listen on, e.g., 7070")]
    port: Option<u16>,

    #[arg(long, short = 't', help = "Response timeout in seconds, e.g., 1.0")]
    timeout: Option<f64>,

    #[arg(long, help = "JSON lines file the oracle records are appended to")]
    oracle: Option<PathBuf>,

    #[arg(long, help = "Command line of the translator process")]
    translator: Option<String>,
}

impl From<Args> for AdapterConfig {
    fn from(args: Args) -> Self {
        Self {
            imp_address: args.imp_address,
            imp_port: args.imp_port,
            timeout: args.timeout,
            interface: args.iface,
            oracle_table: args.oracle,
            port: args.port,
            translator: args.translator,
        }
    }
}

fn main() -> Result<()> {
    env_logger::builder().format_timestamp_millis().init();
    let args = Args::parse();
    let file_config = match &args.config {
        Some(path) => AdapterConfig::load(path)?,
        None => AdapterConfig::default(),
    };
    let settings = Settings::try_from(file_config.merge(AdapterConfig::from(args)))?;
    log::info!("Starting adapter. {:?}", settings);

    let tracker = Tracker::new(settings.imp_address);
    let receiver = EthernetReceiver::new(&settings.interface, CAPTURE_READ_TIMEOUT)?;
    tracker.start(Box::new(receiver))?;

    let src_addr = interface_ipv4(&settings.interface)?;
    let sender = RawSocketSender::new(src_addr, settings.imp_address)?;
    let translator = ProcessTranslator::spawn(&settings.translator)?;
    let oracle: Box<dyn OracleSink> = match &settings.oracle_table {
        Some(path) => Box::new(JsonLinesOracle::open(path)?),
        None => {
            log::warn!("No oracle table configured, records are kept in memory only.");
            Box::new(MemoryOracle::default())
        }
    };

    let mut adapter = Adapter::new(translator, sender, oracle, tracker, settings.imp_port, settings.timeout);
    let listener = TcpListener::bind(("0.0.0.0", settings.port))
        .context(format!("Failed to bind control port {}.", settings.port))?;
    server::run(&mut adapter, listener)
}
