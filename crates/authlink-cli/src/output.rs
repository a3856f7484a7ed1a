//! Rendering of command results.

use authlink_core::{ApiError, ApiResponse};
use serde::Serialize;

pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Print a result either as the JSON envelope or as a human line.
    /// Returns `response.ok`.
    pub fn print<T, F>(&self, response: &ApiResponse<T>, human: F) -> bool
    where
        T: Serialize,
        F: FnOnce(&T) -> String,
    {
        if self.json {
            match serde_json::to_string_pretty(response) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Error: failed to encode result: {}", e),
            }
            return response.ok;
        }

        match (&response.data, response.ok) {
            (Some(data), true) => {
                let text = human(data);
                if !text.is_empty() {
                    println!("{}", text);
                }
            }
            (None, true) => {}
            (_, false) => {
                eprintln!(
                    "Error: {}",
                    response.message.as_deref().unwrap_or("request failed")
                );
            }
        }
        response.ok
    }

    /// Print the outcome of a call made on behalf of the signed-in user.
    ///
    /// Adds a sign-in hint in human mode when the failure means the
    /// session is gone.
    pub fn report<T, F>(&self, result: Result<T, ApiError>, human: F) -> bool
    where
        T: Serialize,
        F: FnOnce(&T) -> String,
    {
        let expired = matches!(&result, Err(e) if e.is_session_expired());
        let ok = self.print(&ApiResponse::from(result), human);
        if expired && !self.json {
            eprintln!("Run `authlink login` to sign in again.");
        }
        ok
    }
}
