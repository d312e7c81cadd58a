/*
 * kernel_info.rs
 *
 * Copyright (C) 2026 Posit Software, PBC. All rights reserved.
 * Licensed under the MIT License. See LICENSE.txt for license information.
 *
 */

use serde::Deserialize;
use serde::Serialize;

/// Version of the Jupyter messaging protocol reported in `kernel_info_reply`.
pub const PROTOCOL_VERSION: &str = "5.3";

/// A link clients may show in their help menu.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HelpLink {
    pub text: String,
    pub url: String,
}

/// The language section of a `kernel_info_reply`.
#[serde_with::skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LanguageInfo {
    pub name: String,
    pub version: String,

    /// MIME type of source files
    pub mimetype: String,

    /// Extension of source files, with the leading dot
    pub file_extension: String,

    /// Only set when highlighting should differ from `name`
    pub pygments_lexer: Option<String>,

    /// Only set when editor mode should differ from `name`
    pub codemirror_mode: Option<String>,
}

/// The content of a `kernel_info_reply`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KernelInfoReply {
    /// "ok" or "error"
    pub status: String,

    pub protocol_version: String,

    pub language_info: LanguageInfo,

    /// Shown by clients when they attach
    pub banner: String,

    pub debugger: bool,

    pub help_links: Vec<HelpLink>,

    pub implementation: String,

    pub implementation_version: String,
}

impl KernelInfoReply {
    /// A successful reply for an implementation whose language shares its
    /// name and version, with no debugger.
    pub fn for_implementation(name: &str, version: &str, banner: &str) -> Self {
        Self {
            status: String::from("ok"),
            protocol_version: String::from(PROTOCOL_VERSION),
            language_info: LanguageInfo {
                name: name.to_string(),
                version: version.to_string(),
                mimetype: String::from("text/plain"),
                file_extension: String::from(".txt"),
                pygments_lexer: None,
                codemirror_mode: None,
            },
            banner: banner.to_string(),
            debugger: false,
            help_links: Vec::new(),
            implementation: name.to_string(),
            implementation_version: version.to_string(),
        }
    }

    pub fn with_help_link(mut self, text: &str, url: &str) -> Self {
        self.help_links.push(HelpLink {
            text: text.to_string(),
            url: url.to_string(),
        });
        self
    }
}
