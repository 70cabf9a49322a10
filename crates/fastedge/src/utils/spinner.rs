use crate::utils::{
    CHECK, MARK,
    styles::{fmt_green, fmt_red},
};
use spinoff::{Color, spinners};
use std::borrow::Cow;
use tracing::log::{Level, error, info, log_enabled};

/// Wrapper around `spinoff::Spinner` to handle only
/// showing if log level is INFO
pub(crate) struct Spinner {
    sp: Option<spinoff::Spinner>,
}

impl Spinner {
    pub(crate) fn new<M: Into<Cow<'static, str>>>(msg: M) -> Self {
        let sp = if log_enabled!(Level::Debug) || !log_enabled!(Level::Info) {
            // level debug or quiet mode
            info!("⣯ {}", msg.into());
            None
        } else {
            Some(spinoff::Spinner::new(spinners::Dots, msg, Color::Yellow))
        };
        Self { sp }
    }

    pub(crate) fn stop_success<M: Into<Cow<'static, str>>>(&mut self, msg: M) {
        let symbol = fmt_green(CHECK);
        if let Some(sp) = self.sp.as_mut() {
            sp.stop_and_persist(&symbol, &msg.into());
        } else {
            info!("{symbol} {}", msg.into());
        }
    }

    pub(crate) fn stop_error<M: Into<Cow<'static, str>>>(&mut self, msg: M) {
        let symbol = fmt_red(MARK);
        if let Some(sp) = self.sp.as_mut() {
            sp.stop_and_persist(&symbol, &msg.into());
        } else {
            error!("{symbol} {}", msg.into());
        }
    }
}
