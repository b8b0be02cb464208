use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use od11::{
    ConnectOptions, DeviceSnapshot, JoinOptions, Od11Client, SourceId, StateUpdate, Volume,
    DEFAULT_COLOR_INDEX, DEFAULT_KEEPALIVE, DEFAULT_NAME, DEFAULT_PROTOCOL_MAJOR,
    DEFAULT_PROTOCOL_MINOR,
};

/// Control a Teenage Engineering OD-11 speaker group over its local
/// WebSocket protocol.
#[derive(Parser)]
#[command(name = "od11ctl", version, about)]
struct Cli {
    /// WebSocket URL of the speaker, e.g. ws://10.0.0.42/ws
    #[arg(long)]
    ws_url: String,

    /// HTTP Origin header for the upgrade request (http or https)
    #[arg(long)]
    origin: Option<String>,

    /// Cookie header for the upgrade request
    #[arg(long)]
    cookie: Option<String>,

    /// Keepalive ping interval in seconds; 0 disables it
    /// [default: 25 for listen, off otherwise]
    #[arg(long)]
    keepalive: Option<u64>,

    /// Protocol major version announced in global_join
    #[arg(long, default_value_t = DEFAULT_PROTOCOL_MAJOR)]
    protocol_major: i64,

    /// Protocol minor version announced in global_join
    #[arg(long, default_value_t = DEFAULT_PROTOCOL_MINOR)]
    protocol_minor: i64,

    /// Display name announced in group_join
    #[arg(long, default_value = DEFAULT_NAME)]
    name: String,

    /// Client identifier announced in group_join
    #[arg(long, default_value = "uid-od11ctl")]
    uid: String,

    /// Color index announced in group_join
    #[arg(long, default_value_t = DEFAULT_COLOR_INDEX)]
    color_index: i64,

    /// Do not request real-time push updates
    #[arg(long)]
    no_realtime_data: bool,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Switch the input source by numeric ID
    SetInputById {
        /// Source ID as listed by show-sources
        id: SourceId,
    },
    /// Switch the input source by name, prefix, or alias
    SetInputByName {
        /// Source name, e.g. "bluetooth", "opt", or "air"
        name: String,
    },
    /// Drive the group volume to an absolute target (0-100)
    SetVolume {
        /// Target volume in percent
        #[arg(allow_negative_numbers = true)]
        target: Volume,
    },
    /// Change the group volume by a signed delta
    Nudge {
        /// Signed volume change, e.g. -5
        #[arg(allow_negative_numbers = true)]
        amount: i64,
    },
    /// Stay connected and print state updates as they arrive
    Listen,
    /// Print the sources advertised by the speaker
    ShowSources,
}

#[tokio::main]
async fn main() -> od11::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let keepalive = match cli.keepalive {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None if matches!(cli.action, Action::Listen) => Some(DEFAULT_KEEPALIVE),
        None => None,
    };

    let join = JoinOptions {
        protocol_major: cli.protocol_major,
        protocol_minor: cli.protocol_minor,
        name: cli.name.clone(),
        uid: cli.uid.clone(),
        color_index: cli.color_index,
        realtime_data: !cli.no_realtime_data,
    };

    let mut opts = ConnectOptions::new(&cli.ws_url)
        .with_join(join)
        .with_keepalive(keepalive);
    if let Some(origin) = &cli.origin {
        opts = opts.with_origin(origin);
    }
    if let Some(cookie) = &cli.cookie {
        opts = opts.with_cookie(cookie);
    }

    let mut client = Od11Client::connect(opts).await?;
    client.wait_until_ready(Duration::from_secs(10)).await?;
    print_summary(&client.snapshot());

    let is_listen = matches!(cli.action, Action::Listen);
    match cli.action {
        Action::SetInputById { id } => {
            client.set_input(id)?;
            println!("Input source set to {}", id);
        }
        Action::SetInputByName { name } => {
            let id = client.set_input_by_name(&name)?;
            println!("Input source set to {} ({})", id, name);
        }
        Action::SetVolume { target } => {
            if client.volume().is_none() {
                // The delta is computed from the last observed volume
                println!("Waiting for volume state...");
                client.poll_snapshot(Duration::from_secs(2)).await;
            }
            client.set_volume_absolute(target)?;
            println!("Volume set to {}", target.clamp(0, 100));
        }
        Action::Nudge { amount } => {
            client.nudge_volume(amount)?;
            println!("Volume nudged by {}", amount);
        }
        Action::ShowSources => {
            let sources = client.sources();
            if sources.is_empty() {
                println!("No sources advertised");
            }
            for (id, name) in &sources {
                let marker = if client.source_id() == Some(*id) {
                    " (active)"
                } else {
                    ""
                };
                println!("{:>3}  {}{}", id, name, marker);
            }
        }
        Action::Listen => listen(&client).await?,
    }

    if !is_listen {
        // Give the writer a moment to flush before tearing the socket down
        tokio::time::sleep(Duration::from_millis(600)).await;
    }
    client.close().await;
    Ok(())
}

fn print_summary(snapshot: &DeviceSnapshot) {
    println!(
        "Joined group: sid {}, volume {}, source {}",
        fmt_opt(snapshot.sid),
        fmt_opt(snapshot.volume),
        snapshot.source_name().unwrap_or("unknown"),
    );
    let pairs: Vec<String> = snapshot
        .sources
        .iter()
        .map(|(id, name)| format!("{}:{}", id, name))
        .collect();
    if pairs.is_empty() {
        println!("Sources: (none)");
    } else {
        println!("Sources: {}", pairs.join(", "));
    }
}

fn fmt_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "unknown".to_string(),
    }
}

async fn listen(client: &Od11Client) -> od11::Result<()> {
    let mut updates = client.subscribe();
    println!("Listening for updates, press Ctrl-C to stop");
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                println!("Stopping");
                return Ok(());
            }
            update = updates.recv() => match update? {
                StateUpdate::VolumeChanged(vol) => println!("Volume: {}", vol),
                StateUpdate::InputSourceChanged(source) => {
                    let name = client
                        .sources()
                        .get(&source)
                        .cloned()
                        .unwrap_or_else(|| format!("source {}", source));
                    println!("Input: {}", name);
                }
                StateUpdate::Pong { rtt_ms: Some(rtt) } => println!("Pong: {} ms", rtt),
                StateUpdate::Pong { rtt_ms: None } => println!("Pong"),
                StateUpdate::Ready => println!("Ready"),
                StateUpdate::Closed => {
                    println!("Disconnected");
                    return Ok(());
                }
            },
        }
    }
}
