// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! One-shot notices carried across a redirect in a short-lived cookie

use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Redirect, Response};

pub const FLASH_COOKIE: &str = "flash";

const CLEAR_COOKIE: &str = "flash=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flash {
    NoFilePart,
    NoSelectedFile,
    InvalidFileType,
}

impl Flash {
    fn code(self) -> &'static str {
        match self {
            Flash::NoFilePart => "no_file_part",
            Flash::NoSelectedFile => "no_selected_file",
            Flash::InvalidFileType => "invalid_file_type",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "no_file_part" => Some(Flash::NoFilePart),
            "no_selected_file" => Some(Flash::NoSelectedFile),
            "invalid_file_type" => Some(Flash::InvalidFileType),
            _ => None,
        }
    }

    pub fn message(self, allowed_extensions: &[String]) -> String {
        match self {
            Flash::NoFilePart => "No file part".to_string(),
            Flash::NoSelectedFile => "No selected file".to_string(),
            Flash::InvalidFileType => {
                let allowed: Vec<String> = allowed_extensions.iter().map(|e| e.to_uppercase()).collect();
                format!("Invalid file type. Only {} are allowed.", allowed.join(", "))
            }
        }
    }
}

/// Redirect to `to`, leaving `flash` for the next page view
pub fn redirect(to: &str, flash: Flash) -> Response {
    let mut response = Redirect::to(to).into_response();
    let cookie = format!(
        "{}={}; Path=/; Max-Age=60; HttpOnly; SameSite=Lax",
        FLASH_COOKIE,
        flash.code()
    );
    if let Ok(value) = cookie.parse() {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

/// Pending notice from the request cookies, if any
pub fn take(headers: &HeaderMap) -> Option<Flash> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == FLASH_COOKIE)
        .and_then(|(_, code)| Flash::from_code(code))
}

/// `Set-Cookie` value that expires the notice once shown
pub fn clear_cookie() -> HeaderValue {
    HeaderValue::from_static(CLEAR_COOKIE)
}
