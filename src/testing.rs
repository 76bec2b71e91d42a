use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::{
    google::{GoogleIdentity, GoogleProfile},
    verification::mailer::Mailer,
};

/// Mailer that keeps every message in memory.
#[derive(Default)]
pub struct RecordingMailer {
    fail: bool,
    attempts: Mutex<Vec<(String, String, String)>>,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            attempts: Mutex::default(),
        }
    }

    /// Delivered messages as `(to, subject, body)`.
    pub fn sent(&self) -> Vec<(String, String, String)> {
        if self.fail {
            return Vec::new();
        }
        self.attempts.lock().unwrap().clone()
    }

    /// The six-digit code in the most recent message, delivered or not.
    pub fn attempted_code(&self) -> Option<String> {
        let attempts = self.attempts.lock().unwrap();
        let (_, _, body) = attempts.last()?;
        body.lines()
            .map(str::trim)
            .find(|l| l.len() == 6 && l.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        self.attempts
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        if self.fail {
            anyhow::bail!("connection refused");
        }
        Ok(())
    }
}

/// What the fake Google endpoint answers for a given token.
#[derive(Clone)]
pub enum GoogleAnswer {
    Profile(GoogleProfile),
    Rejected,
    Unreachable,
}

/// Google endpoints scripted per token. Unknown tokens are rejected.
#[derive(Default, Clone)]
pub struct ScriptedGoogle {
    token_info: Arc<Mutex<HashMap<String, GoogleAnswer>>>,
    user_info: Arc<Mutex<HashMap<String, GoogleAnswer>>>,
}

impl ScriptedGoogle {
    pub fn on_token_info(&self, token: &str, answer: GoogleAnswer) {
        self.token_info.lock().unwrap().insert(token.to_string(), answer);
    }

    pub fn on_user_info(&self, token: &str, answer: GoogleAnswer) {
        self.user_info.lock().unwrap().insert(token.to_string(), answer);
    }

    fn answer(
        table: &Mutex<HashMap<String, GoogleAnswer>>,
        token: &str,
    ) -> anyhow::Result<Option<GoogleProfile>> {
        match table.lock().unwrap().get(token).cloned() {
            Some(GoogleAnswer::Profile(p)) => Ok(Some(p)),
            Some(GoogleAnswer::Unreachable) => anyhow::bail!("google unreachable"),
            Some(GoogleAnswer::Rejected) | None => Ok(None),
        }
    }
}

#[async_trait]
impl GoogleIdentity for ScriptedGoogle {
    async fn token_info(&self, id_token: &str) -> anyhow::Result<Option<GoogleProfile>> {
        Self::answer(&self.token_info, id_token)
    }

    async fn user_info(&self, access_token: &str) -> anyhow::Result<Option<GoogleProfile>> {
        Self::answer(&self.user_info, access_token)
    }
}

pub fn profile(email: &str, given: &str, family: &str) -> GoogleProfile {
    GoogleProfile {
        email: email.into(),
        given_name: given.into(),
        family_name: family.into(),
        name: format!("{given} {family}").trim().to_string(),
    }
}
