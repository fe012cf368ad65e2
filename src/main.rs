use dotenvy::dotenv;
use media_relay_bot::bot::handlers::{
    get_user_id_safe, handle_media, handle_no_media, handle_unauthorized, has_attachment, start,
    Command,
};
use media_relay_bot::bot::UnauthorizedCache;
use media_relay_bot::config::{
    get_unauthorized_cache_max_size, get_unauthorized_cache_ttl, get_unauthorized_cooldown,
    Settings,
};
use media_relay_bot::relay::MediaRelay;
use regex::Regex;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting the bot token from log output
struct RedactionPatterns {
    token_url: Regex,
    token_bare: Regex,
}

impl RedactionPatterns {
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token_url: Regex::new(r"(bot)([0-9]{6,12}:[A-Za-z0-9_-]{30,})")?,
            token_bare: Regex::new(r"\b[0-9]{6,12}:[A-Za-z0-9_-]{30,}")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let output = self
            .token_url
            .replace_all(input, "$1[TELEGRAM_TOKEN]")
            .to_string();
        self.token_bare
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string()
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        self.inner
            .write_all(self.patterns.redact(&s).as_bytes())?;
        // Report the original length; the caller must not retry the redacted difference
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: (self.make_inner)(),
            patterns: self.patterns.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    // Settings come first: they decide whether a log file is written
    let settings = match Settings::new() {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = init_logging(patterns, settings.log_file.as_deref())?;

    info!("Starting Telegram Media Converter Bot...");
    info!(
        max_video_duration_secs = settings.max_video_duration_secs,
        max_video_size_bytes = settings.max_video_size_bytes,
        ffmpeg = %settings.ffmpeg_path,
        work_dir = %settings.work_dir().display(),
        "Configuration loaded successfully."
    );

    if let Err(e) = tokio::fs::create_dir_all(settings.work_dir()).await {
        error!("Failed to create work dir: {}", e);
        std::process::exit(1);
    }

    let relay = Arc::new(MediaRelay::with_ffmpeg(&settings));
    let bot = Bot::new(settings.telegram_token.clone());
    let unauthorized_cache = init_unauthorized_cache();

    info!("Bot is running. Press Ctrl+C to stop.");

    Dispatcher::builder(bot, setup_handler())
        .dependencies(dptree::deps![settings, relay, unauthorized_cache])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

/// Stderr logging plus an optional log file, both with the token redacted.
///
/// The returned guard flushes the file writer on drop and must live until exit.
fn init_logging(
    patterns: Arc<RedactionPatterns>,
    log_file: Option<&Path>,
) -> io::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(RedactingMakeWriter::new(io::stderr, patterns.clone()));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(RedactingMakeWriter::new(move || writer.clone(), patterns));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn init_unauthorized_cache() -> Arc<UnauthorizedCache> {
    let cooldown = get_unauthorized_cooldown();
    let ttl = get_unauthorized_cache_ttl();
    let max_size = get_unauthorized_cache_max_size();

    info!(
        "Initializing UnauthorizedCache (cooldown: {}s, ttl: {}s, max_size: {})",
        cooldown, ttl, max_size
    );

    Arc::new(UnauthorizedCache::new(cooldown, ttl, max_size))
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .branch(
            dptree::filter(|msg: Message, settings: Arc<Settings>| {
                settings.is_user_allowed(get_user_id_safe(&msg))
            })
            .branch(
                dptree::entry()
                    .filter_command::<Command>()
                    .endpoint(handle_command),
            )
            .branch(dptree::filter(|msg: Message| has_attachment(&msg)).endpoint(on_media))
            .branch(dptree::endpoint(on_other)),
        )
        // Everyone who did not pass the filter above is unauthorized
        .branch(dptree::endpoint(on_unauthorized))
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    relay: Arc<MediaRelay>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start | Command::Help => start(bot, msg, relay).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn on_media(
    bot: Bot,
    msg: Message,
    relay: Arc<MediaRelay>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handle_media(bot, msg, relay).await {
        error!("Media handler error: {}", e);
    }
    respond(())
}

async fn on_other(bot: Bot, msg: Message) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handle_no_media(bot, msg).await {
        error!("Message handler error: {}", e);
    }
    respond(())
}

async fn on_unauthorized(
    bot: Bot,
    msg: Message,
    cache: Arc<UnauthorizedCache>,
) -> Result<(), teloxide::RequestError> {
    let user_id = get_user_id_safe(&msg);
    if let Err(e) = handle_unauthorized(bot, msg, cache).await {
        error!("Failed to send access denied message to {}: {}", user_id, e);
    }
    respond(())
}
