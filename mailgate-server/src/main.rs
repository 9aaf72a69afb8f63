use anyhow::{Context, Result};
use chrono::Local;
use getopts::Options;
use log::info;
use mailgate::{Maildir, Muxer, Server, SslConfig};
use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::env;
use std::fs::File;
use std::path::Path;
use std::process;

const DEFAULT_ADDRESS: &str = "127.0.0.1:8025";
const DEFAULT_MAILDIR: &str = "./maildir";

// Command line option names
const OPT_HELP: &str = "help";
const OPT_ADDRESS: &str = "address";
const OPT_LOG: &str = "log";
const OPT_SERVER: &str = "server";
const OPT_MAILDIR: &str = "maildir";
const OPT_SSL_CERT: &str = "ssl-cert";
const OPT_SSL_KEY: &str = "ssl-key";
const OPT_SSL_CHAIN: &str = "ssl-chain";

fn setup_logger(log_dir: Option<&str>) -> Result<()> {
    let term_logger = TermLogger::new(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![term_logger];
    if let Some(log_dir) = log_dir {
        let datetime = Local::now().format("%Y%m%d%H%M%S").to_string();
        let filename = format!("smtp-{}.log", datetime);
        let filepath = Path::new(log_dir).join(filename);
        let file = File::create(&filepath)
            .with_context(|| format!("cannot create {}", filepath.display()))?;
        loggers.push(WriteLogger::new(LevelFilter::Trace, Config::default(), file));
    }
    CombinedLogger::init(loggers).context("cannot initialize logger")
}

fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {} [options]", program);
    print!("{}", opts.usage(&brief));
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let mut opts = Options::new();
    opts.optflag("h", OPT_HELP, "print this help menu");
    opts.optopt("a", OPT_ADDRESS, "the address to listen on", "ADDRESS");
    opts.optopt("l", OPT_LOG, "the directory to write logs to", "LOG_DIR");
    opts.optopt("s", OPT_SERVER, "the name of the mailserver", "SERVER");
    opts.optopt("m", OPT_MAILDIR, "the maildir to deliver mail into", "DIR");
    opts.optopt("", OPT_SSL_CERT, "ssl certificate", "PEM_FILE");
    opts.optopt("", OPT_SSL_KEY, "ssl certificate key", "PEM_FILE");
    opts.optopt(
        "",
        OPT_SSL_CHAIN,
        "ssl chain of trust for the certificate",
        "PEM_FILE",
    );
    let matches = opts
        .parse(&args[1..])
        .context("error parsing command line")?;
    if matches.opt_present(OPT_HELP) {
        print_usage(&args[0], &opts);
        return Ok(());
    }
    setup_logger(matches.opt_str(OPT_LOG).as_deref())?;

    let ssl_config = match (
        matches.opt_str(OPT_SSL_CERT),
        matches.opt_str(OPT_SSL_KEY),
        matches.opt_str(OPT_SSL_CHAIN),
    ) {
        (Some(cert_path), Some(key_path), Some(chain_path)) => SslConfig::Trusted {
            cert_path,
            key_path,
            chain_path,
        },
        (Some(cert_path), Some(key_path), None) => SslConfig::SelfSigned {
            cert_path,
            key_path,
        },
        (_, _, _) => SslConfig::None,
    };
    let addr = matches
        .opt_str(OPT_ADDRESS)
        .unwrap_or_else(|| DEFAULT_ADDRESS.to_owned());
    let maildir_path = matches
        .opt_str(OPT_MAILDIR)
        .unwrap_or_else(|| DEFAULT_MAILDIR.to_owned());

    let maildir = Maildir::new(maildir_path.as_str())
        .with_context(|| format!("cannot open maildir {}", maildir_path))?;
    info!("delivering mail into {}", maildir_path);
    let mut muxer = Muxer::new();
    muxer.set_default_handler(maildir);

    let mut server = Server::new(muxer);
    server.with_ssl(ssl_config);
    if let Some(name) = matches.opt_str(OPT_SERVER) {
        server.with_name(name);
    }
    server
        .with_addr(addr.as_str())
        .with_context(|| format!("invalid address {}", addr))?;
    server.serve_forever()?;
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        process::exit(1);
    }
}
