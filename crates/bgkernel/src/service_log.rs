//
// service_log.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

use std::fmt;
use std::sync::Arc;

use log::{Level, Record};

const TARGET: &str = "bgkernel";

/// Operator-facing log of one service instance.
///
/// Records go to the logger the host supplied for this instance, or to the
/// global `log` facade when it supplied none.
#[derive(Clone, Default)]
pub struct ServiceLog {
    logger: Option<Arc<dyn log::Log>>,
}

impl fmt::Debug for ServiceLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceLog")
            .field("custom_logger", &self.logger.is_some())
            .finish()
    }
}

impl ServiceLog {
    pub fn new(logger: Option<Arc<dyn log::Log>>) -> Self {
        Self { logger }
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        match self.logger {
            Some(ref logger) => {
                let record = Record::builder()
                    .args(args)
                    .level(level)
                    .target(TARGET)
                    .module_path_static(Some(module_path!()))
                    .build();
                if logger.enabled(record.metadata()) {
                    logger.log(&record);
                    logger.flush();
                }
            }
            None => log::log!(target: TARGET, level, "{}", args),
        }
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }
}
