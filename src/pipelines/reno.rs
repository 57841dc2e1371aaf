//! Renovation planning: a room-by-room interview, then a structured plan.
use super::vision::vision_facts;
use super::Resources;
use crate::error::{StoreError, StoreResult};
use crate::lm::{parse_json_reply, ChatMessage, Reasoner};
use crate::store::{CallRequest, DealStore, ExternalCall, WorkflowKind};
use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use tracing::{info, warn};

const PLAN_REQUEST: &str = "That covers all rooms. Please now generate the complete structured \
renovation plan as JSON, following the output schema in your instructions.";

/// The interview prompt with the acceptable stores appended.
pub fn system_prompt(prompt: &str, stores: &[Value]) -> String {
    let stores = serde_json::to_string_pretty(stores).unwrap_or_else(|_| "[]".to_string());
    format!("{prompt}\n\nAcceptable stores: {stores}")
}

pub struct RenoPipeline<'a> {
    pub reasoner: &'a dyn Reasoner,
    pub system_prompt: String,
}

impl ExternalCall for RenoPipeline<'_> {
    fn preflight(&self, request: &CallRequest<'_>) -> Result<(), String> {
        let messages = transcript(request.inputs)?;
        if messages.is_empty() {
            return Err("the interview transcript is empty; start with `reno-chat`".to_string());
        }
        Ok(())
    }

    fn call(&self, request: &CallRequest<'_>) -> Result<Value> {
        let mut messages = transcript(request.inputs).map_err(|message| anyhow!(message))?;
        messages.push(ChatMessage::user(PLAN_REQUEST));
        let reply = self.reasoner.chat(&self.system_prompt, &messages)?;
        Ok(plan_from_reply(reply))
    }
}

fn plan_from_reply(reply: String) -> Value {
    match parse_json_reply(&reply) {
        Ok(plan) if plan.is_object() => plan,
        Ok(_) | Err(_) => {
            warn!(bytes = reply.len(), "reno plan reply was not a JSON object");
            json!({ "raw_plan": reply, "parse_error": true })
        }
    }
}

/// The interview so far, from the `messages` field of the Reno input set.
pub fn transcript(inputs: &Value) -> Result<Vec<ChatMessage>, String> {
    match inputs.get("messages") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(messages) => serde_json::from_value(messages.clone())
            .map_err(|err| format!("`messages` is not a chat transcript: {err}")),
    }
}

fn opening_message(store: &DealStore, deal_id: &str, message: &str) -> StoreResult<String> {
    let deal = store.get_deal(deal_id)?;
    let mut text = format!(
        "I'm planning a renovation for {}. Please guide me through a room-by-room \
         interview to define the scope.",
        deal.record.address
    );
    let vision = deal
        .input(WorkflowKind::Cma)
        .and_then(|set| vision_facts(&set.payload))
        .filter(|vision| vision.as_object().is_some_and(|map| !map.is_empty()));
    if let Some(vision) = vision {
        let facts = serde_json::to_string_pretty(vision).map_err(anyhow::Error::from)?;
        text.push_str("\n\nProperty details from the listing photos:\n");
        text.push_str(&facts);
    }
    if !message.trim().is_empty() {
        text.push_str("\n\n");
        text.push_str(message);
    }
    Ok(text)
}

/// Run one interview turn and append both sides to the transcript.
///
/// The model is called without the deal lock; if the transcript was saved
/// again meanwhile the reply is discarded with `StaleInput`.
pub fn reno_chat(
    store: &DealStore,
    deal_id: &str,
    reasoner: &dyn Reasoner,
    resources: &Resources,
    message: &str,
) -> StoreResult<String> {
    let kind = WorkflowKind::Reno;
    let deal = store.get_deal(deal_id)?;
    let revision = deal.input(kind).map(|set| set.revision).unwrap_or(0);
    let mut messages = deal
        .input(kind)
        .map(|set| transcript(&set.payload))
        .transpose()
        .map_err(|message| StoreError::InvalidInput { kind, message })?
        .unwrap_or_default();
    let seen = messages.len();

    let content = if messages.is_empty() {
        opening_message(store, deal_id, message)?
    } else if message.trim().is_empty() {
        return Err(StoreError::InvalidInput {
            kind,
            message: "empty reply".to_string(),
        });
    } else {
        message.to_string()
    };
    messages.push(ChatMessage::user(content.clone()));

    let prompt = system_prompt(&resources.reno_prompt, &resources.stores);
    let reply = reasoner
        .chat(&prompt, &messages)
        .map_err(|err| StoreError::ExternalCall {
            kind,
            message: format!("{err:#}"),
        })?;

    let turn = [ChatMessage::user(content), ChatMessage::assistant(reply.clone())];
    let saved = store.update_workflow_input_at(deal_id, kind, revision, |mut payload| {
        let mut updated = transcript(&payload)
            .map_err(|message| StoreError::InvalidInput { kind, message })?;
        updated.extend(turn);
        let updated = serde_json::to_value(updated).map_err(anyhow::Error::from)?;
        match payload.as_object_mut() {
            Some(map) => {
                map.insert("messages".to_string(), updated);
            }
            None => payload = json!({ "messages": updated }),
        }
        Ok(payload)
    })?;
    info!(deal = %deal_id, revision = saved.revision, turns = seen / 2 + 1, "reno interview turn");
    Ok(reply)
}
