use clap::Parser;
use pktstream::http::{Headers, HttpClient, Method};
use pktstream::net::{ConnectionConfig, Family, TlsConfig};
use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pktget")]
#[command(about = "Fetch a URL over the pktstream HTTP/1.1 client", long_about = None)]
struct Cli {
    /// http:// or https:// URL to fetch
    url: String,

    /// Request method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Extra request header, as 'Name: value'
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body
    #[arg(short, long)]
    data: Option<String>,

    /// Skip TLS certificate and host name verification
    #[arg(long)]
    insecure: bool,

    /// Resolve to IPv6 addresses only
    #[arg(short = '6', long)]
    ipv6: bool,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,

    /// Print the status line and response headers
    #[arg(short, long)]
    include: bool,

    /// Log connection events
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "pktstream=debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let method = Method::from_str(&cli.method)?;

    let mut headers = Vec::with_capacity(cli.headers.len());
    for line in &cli.headers {
        headers.push(Headers::parse_header_line(line)?);
    }
    let headers: Vec<(&str, &str)> = headers.iter().map(|(n, v)| (n.as_str(), v.as_str())).collect();

    let tls = TlsConfig::client().verify_peer(!cli.insecure).build();
    let config = ConnectionConfig::builder()
        .connect_timeout(Some(Duration::from_secs(cli.connect_timeout)))
        .tls(tls)
        .build();

    let mut client = HttpClient::new(config);
    if cli.ipv6 {
        client.set_family(Family::V6);
    }

    client.request(&cli.url, method, &headers, cli.data.as_deref().map(str::as_bytes))?;
    let ok = client.fetch().await;

    if !client.is_finished() || client.status_code() == 0 {
        return Err(format!("no response from {}", cli.url).into());
    }

    let mut out = std::io::stdout().lock();
    if cli.include {
        writeln!(out, "{}", client.response_status())?;
        write!(out, "{}", *client.response_headers())?;
        writeln!(out)?;
    }
    out.write_all(&client.body())?;
    out.flush()?;

    tracing::debug!(status = client.status_code(), bytes = client.body_length(), ok, "done");
    Ok(ok)
}
