use tracing::{debug, level_filters::LevelFilter, Dispatch};
use tracing_subscriber::{
    fmt::format::{Format, Writer},
    EnvFilter,
};

struct CustomTimer;

impl tracing_subscriber::fmt::time::FormatTime for CustomTimer {
    fn format_time(&self, writer: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        write!(writer, "{} - {}", now.format("%d %B"), now.format("%H:%M:%S%.6f"))
    }
}

/// The console subscriber as a [`Dispatch`], for handing to a single stage with
/// `SqliteWriter::with_dispatch` instead of installing it globally.
pub fn console_dispatch(log_level: LevelFilter) -> Dispatch {
    let filter = EnvFilter::from_default_env().add_directive(log_level.into());

    let format = Format::default().with_timer(CustomTimer).with_level(true).with_target(false);

    let subscriber =
        tracing_subscriber::fmt().with_env_filter(filter).event_format(format).finish();

    Dispatch::new(subscriber)
}

pub fn setup_logger(log_level: LevelFilter) {
    if tracing::dispatcher::set_global_default(console_dispatch(log_level)).is_err() {
        debug!("Logger has already been set up, continuing...");
    }
}

pub fn setup_info_logger() {
    setup_logger(LevelFilter::INFO);
}
