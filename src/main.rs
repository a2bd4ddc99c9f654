use std::net::SocketAddr;
use std::time::{Duration, Instant};

use clap::clap_app;
use pcmbridge::{
    Bridge, BridgeConfig, Direction, Endpoint, OpenMode, SampleFormat, Sink, Source,
    VirtualDevice,
};
use tokio::io::AsyncReadExt;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let matches = clap_app!(
        pcmbridge =>
            (@subcommand play =>
             (@arg CONFIG: -c --config +takes_value "bridge configuration file")
             (@arg URI: -u --uri +takes_value "remote sink, tcp://host[:port]")
             (@arg FORMAT: -f --format +takes_value "sample format, rate:bits:channels")
             (@arg SECONDS: -s --seconds +takes_value "how long to play")
             (@arg FREQUENCY: -F --frequency +takes_value "tone frequency in Hz")
            )
            (@subcommand listen =>
             (@arg BIND: -b --bind +takes_value "address to accept streams on")
            )
    )
    .get_matches();

    if let Some(matches) = matches.subcommand_matches("play") {
        let mut config = match matches.value_of("CONFIG") {
            Some(path) => BridgeConfig::open(path)?,
            None => BridgeConfig::default(),
        };
        if let Some(uri) = matches.value_of("URI") {
            config.endpoint = Endpoint::from_str(uri)?;
        }
        if let Some(format) = matches.value_of("FORMAT") {
            config.format = SampleFormat::from_str(format)?;
        }
        let seconds: f32 = matches
            .value_of("SECONDS")
            .map(|s| s.parse::<f32>())
            .transpose()?
            .unwrap_or(10.0);
        let frequency: f32 = matches
            .value_of("FREQUENCY")
            .map(|s| s.parse::<f32>())
            .transpose()?
            .unwrap_or(440.0);

        pcmbridge::logging::init(&config.logfilter, config.logfile.as_deref())?;
        // the bridge sleeps its caller, so keep it off the runtime
        tokio::task::spawn_blocking(move || play(config, seconds, frequency)).await??;
    }

    if let Some(matches) = matches.subcommand_matches("listen") {
        let addr: SocketAddr = if let Some(b) = matches.value_of("BIND") {
            b.parse()?
        } else {
            ([127, 0, 0, 1], pcmbridge::DEFAULT_PORT).into()
        };
        pcmbridge::logging::init("", None)?;
        listen(addr).await?;
    }

    Ok(())
}

fn play(config: BridgeConfig, seconds: f32, frequency: f32) -> anyhow::Result<()> {
    let bridge = Bridge::open(&config, Direction::Playback, OpenMode::Blocking)?;
    let params = bridge.capabilities().default_params(&config.format);
    bridge.prepare(&params)?;
    bridge.start()?;

    let format = config.format;
    let channels = format.channels() as usize;
    let mut source = pcmbridge::source::Sine::new(format.rate() as f32, format.channels(), frequency);
    let mut sink = pcmbridge::sink::DeviceSink::new(bridge, &params);
    let mut buffer = vec![0.0; params.period_size as usize * channels];

    let total = (seconds.max(0.0) * format.rate() as f32) as u64;
    let mut frames = 0;
    println!("playing {}Hz to {} as {}", frequency, config.endpoint, format);
    while frames < total {
        let want = (total - frames).min(params.period_size) as usize;
        let got = source.fill(&mut buffer[..want * channels]);
        sink.write(&buffer[..got])?;
        frames += want as u64;
    }

    let bridge = sink.into_inner();
    bridge.drain()?;
    println!(
        "pointer {} of {}, {} frames written",
        bridge.pointer()?,
        params.buffer_size,
        bridge.frames_written()
    );
    if let Some(stats) = bridge.stats() {
        println!(
            "{} connections in {} attempts, {} bytes sent, {} dropped",
            stats.connections, stats.connect_attempts, stats.bytes_sent, stats.bytes_dropped
        );
    }
    bridge.close()?;
    Ok(())
}

/// Accept raw PCM streams and report how much each delivers.
async fn listen(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("listening on tcp://{}", listener.local_addr()?);
    loop {
        let (mut socket, peer) = listener.accept().await?;
        tracing::info!(%peer, "stream connected");
        tokio::spawn(async move {
            let mut buf = vec![0u8; 16 * 1024];
            let mut total = 0u64;
            let mut last = Instant::now();
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        total += n as u64;
                        if last.elapsed() >= Duration::from_secs(1) {
                            tracing::info!(%peer, total, "receiving");
                            last = Instant::now();
                        }
                    }
                    Err(e) => {
                        tracing::warn!(%peer, "read failed: {}", e);
                        break;
                    }
                }
            }
            tracing::info!(%peer, total, "stream closed");
        });
    }
}
