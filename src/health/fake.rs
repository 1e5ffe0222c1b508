// ABOUTME: Scripted HTTP probe for unit tests.
// ABOUTME: Replays queued responses per URL, then a fallback, and counts calls.

use super::{HttpProbe, ProbeError, ProbeResponse};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

type Reply = Result<ProbeResponse, ProbeError>;

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<Reply>>,
    fallback: HashMap<String, Reply>,
    calls: Vec<String>,
}

#[derive(Default)]
pub(crate) struct ScriptedProbe {
    script: Mutex<Script>,
}

impl ScriptedProbe {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn healthy() -> Reply {
        Ok(ProbeResponse::new(200, r#"{"status":"healthy"}"#))
    }

    pub(crate) fn unhealthy() -> Reply {
        Ok(ProbeResponse::new(503, r#"{"status":"unhealthy"}"#))
    }

    pub(crate) fn refused() -> Reply {
        Err(ProbeError::Connect("connection refused".to_string()))
    }

    /// Queue one reply for the next request to `url`.
    pub(crate) fn then(&self, url: &str, reply: Reply) -> &Self {
        self.script
            .lock()
            .queued
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Reply used once the queue for `url` is drained.
    pub(crate) fn always(&self, url: &str, reply: Reply) -> &Self {
        self.script.lock().fallback.insert(url.to_string(), reply);
        self
    }

    pub(crate) fn calls_to(&self, url: &str) -> usize {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|c| c.as_str() == url)
            .count()
    }

    fn reply(&self, url: &str) -> Reply {
        let mut script = self.script.lock();
        script.calls.push(url.to_string());
        if let Some(reply) = script.queued.get_mut(url).and_then(VecDeque::pop_front) {
            return reply;
        }
        script
            .fallback
            .get(url)
            .cloned()
            .unwrap_or_else(Self::refused)
    }
}

#[async_trait]
impl HttpProbe for ScriptedProbe {
    async fn get(&self, url: &str) -> Result<ProbeResponse, ProbeError> {
        self.reply(url)
    }

    async fn post_json(
        &self,
        url: &str,
        _body: &serde_json::Value,
    ) -> Result<ProbeResponse, ProbeError> {
        self.reply(url)
    }
}
