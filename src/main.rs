use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    let config = podcastr::config::load_config()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    podcastr::app::run_with_startup(options, config)
}

fn parse_args(args: Vec<String>) -> anyhow::Result<podcastr::app::AppStartupOptions> {
    let mut out = podcastr::app::AppStartupOptions::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--catalog" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--catalog requires a file path");
                };
                if value.trim().is_empty() {
                    anyhow::bail!("--catalog cannot be empty");
                }
                out.catalog = Some(value.trim().into());
            }
            "--start" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--start requires an episode index");
                };
                let start = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| anyhow::anyhow!("--start expects a number, got {value}"))?;
                out.start_index = Some(start);
            }
            "--null-device" => out.null_device = true,
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument {other}"),
        }
        index += 1;
    }
    Ok(out)
}

fn print_help() {
    println!("podcastr");
    println!("  --catalog <file>   JSON array of episodes to choose from");
    println!("  --start <index>    Queue the whole catalog starting at this episode");
    println!("  --null-device      Simulate playback instead of opening an audio output");
}
