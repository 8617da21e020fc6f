use crate::config::{LogFormat, PgProperties};
use crate::errors::Error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Build the filter: RUST_LOG directives plus the configured level (default "info").
pub fn filter(props: &PgProperties) -> Result<EnvFilter, Error> {
    let level: LevelFilter = match props.log_level.parse() {
        Ok(level) => level,
        Err(err) => {
            return Err(Error::BadConfig(format!(
                "Invalid log level {}: {}",
                props.log_level, err
            )))
        }
    };
    Ok(EnvFilter::from_default_env().add_directive(level.into()))
}

/// Install the global subscriber. Records emitted through `log` are captured too.
pub fn init(props: &PgProperties) -> Result<(), Error> {
    let filter = filter(props)?;
    let trace_sub = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match props.log_format {
        LogFormat::Structured => trace_sub.json().try_init(),
        LogFormat::Debug => trace_sub.pretty().try_init(),
        LogFormat::Text => trace_sub.try_init(),
    };
    match result {
        Ok(_) => Ok(()),
        Err(err) => Err(Error::BadConfig(format!(
            "Could not install logger: {}",
            err
        ))),
    }
}
