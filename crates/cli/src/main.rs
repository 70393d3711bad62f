mod daemon;

use anyhow::{Context, Result, bail};
use arboard::Clipboard;
use clap::Parser;
use daemon::Hotkey;
use glance_core::ui::DEFAULT_QUERY;
use glance_core::{Config, Glance, Provider, Rect, init};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Question to ask about the captured region
    #[arg(trailing_var_arg = true)]
    prompt: Vec<String>,

    /// Override the model defined in .env
    #[arg(short, long)]
    model: Option<String>,

    /// Override the provider (openai or gemini)
    #[arg(short, long)]
    provider: Option<Provider>,

    /// Copy the answer to the clipboard
    #[arg(short, long, default_value_t = false)]
    copy: bool,

    /// List available displays and exit
    #[arg(long)]
    list_displays: bool,

    /// Display to capture with --region (defaults to the primary display)
    #[arg(long, requires = "region")]
    display: Option<u32>,

    /// Capture X,Y,W,H (display points) without the overlay
    #[arg(long, value_parser = parse_region)]
    region: Option<Rect>,

    /// Stay in the background and open the overlay on each hotkey press
    #[arg(long, conflicts_with_all = ["region", "list_displays"])]
    daemon: bool,

    /// Key chord for --daemon
    #[arg(long, default_value = "ctrl+alt+x", requires = "daemon")]
    hotkey: Hotkey,
}

fn parse_region(s: &str) -> std::result::Result<Rect, String> {
    let values: Vec<f64> = s
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| format!("invalid number in region: {}", e))?;

    match values.as_slice() {
        [x, y, w, h] if *w > 0.0 && *h > 0.0 => Ok(Rect::new(*x, *y, *w, *h)),
        [_, _, _, _] => Err("region width and height must be positive".to_string()),
        _ => Err("expected X,Y,W,H".to_string()),
    }
}

fn main() -> Result<()> {
    init();
    let args = Args::parse();

    // Load config and apply CLI overrides
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(provider) = args.provider {
        if provider != config.provider && args.model.is_none() {
            config.model_name = provider.default_model().to_string();
        }
        config.provider = provider;
    }
    if let Some(m) = args.model.clone() {
        config.model_name = m;
    }
    log::debug!("Effective configuration: {:?}", config);

    let app = Glance::with_config(config).context("Failed to initialize")?;

    if args.list_displays {
        println!("Available displays:");
        for display in app.list_displays().context("Failed to enumerate displays")? {
            println!("{}", display);
        }
        return Ok(());
    }

    if args.daemon {
        return daemon::run(&app, args.hotkey);
    }

    match args.region {
        Some(region) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create async runtime")?;
            runtime.block_on(run_headless(&app, &args, region))
        }
        None => app.run_interactive().context("Overlay failed"),
    }
}

async fn run_headless(app: &Glance, args: &Args, region: Rect) -> Result<()> {
    let display_id = match args.display {
        Some(id) => id,
        None => app
            .list_displays()?
            .iter()
            .find(|d| d.is_primary)
            .map(|d| d.id)
            .context("No primary display found, pass --display")?,
    };

    let image = app
        .capture_region(display_id, region)
        .await
        .context("Failed to capture region. Try --list-displays to check ids")?;
    let Some(image) = image else {
        bail!("The region does not overlap display {}", display_id);
    };

    let prompt = read_prompt(&args.prompt)?;

    println!(); // Spacer
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("{spinner:.green} {msg}")?,
    );
    spinner.set_message(format!("Analyzing with {}...", app.config().model_name));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut answer = String::new();
    let mut stdout = io::stdout();
    let outcome = app
        .analyze(&image, &prompt, |chunk| {
            if !spinner.is_finished() {
                spinner.finish_and_clear();
            }
            let _ = write!(stdout, "{}", chunk);
            let _ = stdout.flush();
            answer.push_str(chunk);
        })
        .await;
    spinner.finish_and_clear();
    println!();

    outcome.context("Analysis failed")?;

    if args.copy {
        match Clipboard::new() {
            Ok(mut clipboard) => match clipboard.set_text(answer) {
                Ok(()) => println!("(Copied to clipboard)"),
                Err(e) => eprintln!("Warning: Failed to copy to clipboard: {}", e),
            },
            Err(e) => eprintln!("Warning: Could not access clipboard: {}", e),
        }
    }

    Ok(())
}

/// The prompt from the command line, or one line from stdin.
fn read_prompt(words: &[String]) -> Result<String> {
    let prompt = words.join(" ");
    if !prompt.trim().is_empty() {
        return Ok(prompt);
    }

    print!("Enter prompt (default: 'Explain this'): ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(match input.trim() {
        "" => DEFAULT_QUERY.to_string(),
        line => line.to_string(),
    })
}
