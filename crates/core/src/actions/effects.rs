//! Concrete leaf effects.
//!
//! Each effect delegates to the [`Environment`](crate::environment::Environment)
//! and turns mismatches into [`ActionError::EffectFailed`] with a message
//! naming the element.

use async_trait::async_trait;
use std::time::Duration;
use tm_protocol::ipc::Event;
use tm_protocol::run_models::Key;
use tracing::info;

use super::{EffectContext, LeafEffect, Lookup};
use crate::environment::ElementInfo;
use crate::error::ActionError;
use crate::session::Decision;

fn name(element: Option<&str>) -> &str {
    element.unwrap_or("UNKNOWN")
}

#[derive(Debug, Clone)]
pub struct Click;

#[async_trait]
impl LeafEffect for Click {
    fn kind(&self) -> &'static str {
        "Click"
    }

    fn describe(&self, element: Option<&str>) -> String {
        format!("Click in {}", name(element))
    }

    fn lookup(&self) -> Lookup {
        Lookup::Present
    }

    async fn apply(&self, ctx: &EffectContext<'_>, target: Option<&ElementInfo>) -> Result<(), ActionError> {
        let target = ctx.require(target)?;
        ctx.env.click(&target.handle).await?;
        Ok(())
    }
}

/// Writes a value into an input, or the first input wrapped by the element.
#[derive(Debug, Clone)]
pub struct TypeText {
    pub value: String,
    /// Hide the value from descriptions and summaries.
    pub password: bool,
}

#[async_trait]
impl LeafEffect for TypeText {
    fn kind(&self) -> &'static str {
        if self.password {
            "TypePassword"
        } else {
            "Type"
        }
    }

    fn describe(&self, element: Option<&str>) -> String {
        if self.password {
            format!("Type a password in {}", name(element))
        } else {
            format!("Type value '{}' in {}", self.value, name(element))
        }
    }

    fn value(&self) -> Option<String> {
        (!self.password).then(|| self.value.clone())
    }

    fn lookup(&self) -> Lookup {
        Lookup::Present
    }

    async fn apply(&self, ctx: &EffectContext<'_>, target: Option<&ElementInfo>) -> Result<(), ActionError> {
        let target = ctx.require(target)?;
        ctx.env
            .set_value(&target.handle, &self.value)
            .await
            .map_err(|e| {
                ActionError::EffectFailed(format!(
                    "{e}. Not able to type value in element {}",
                    ctx.element_name()
                ))
            })
    }
}

#[derive(Debug, Clone)]
pub struct Select {
    pub value: String,
}

#[async_trait]
impl LeafEffect for Select {
    fn kind(&self) -> &'static str {
        "Select"
    }

    fn describe(&self, element: Option<&str>) -> String {
        format!("Select value '{}' in {}", self.value, name(element))
    }

    fn value(&self) -> Option<String> {
        Some(self.value.clone())
    }

    fn lookup(&self) -> Lookup {
        Lookup::Present
    }

    async fn apply(&self, ctx: &EffectContext<'_>, target: Option<&ElementInfo>) -> Result<(), ActionError> {
        let target = ctx.require(target)?;
        ctx.env
            .set_value(&target.handle, &self.value)
            .await
            .map_err(|e| {
                ActionError::EffectFailed(format!(
                    "{e}. Not able to select value in element {}",
                    ctx.element_name()
                ))
            })
    }
}

#[derive(Debug, Clone)]
pub struct PressKey {
    pub key: Key,
}

#[async_trait]
impl LeafEffect for PressKey {
    fn kind(&self) -> &'static str {
        "PressKey"
    }

    fn describe(&self, element: Option<&str>) -> String {
        format!("Press {} key in {}", self.key, name(element))
    }

    fn value(&self) -> Option<String> {
        Some(self.key.to_string())
    }

    fn lookup(&self) -> Lookup {
        Lookup::Present
    }

    async fn apply(&self, ctx: &EffectContext<'_>, target: Option<&ElementInfo>) -> Result<(), ActionError> {
        let target = ctx.require(target)?;
        ctx.env.press_key(&target.handle, self.key).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AssertTextIs {
    pub text: String,
}

#[async_trait]
impl LeafEffect for AssertTextIs {
    fn kind(&self) -> &'static str {
        "AssertTextIs"
    }

    fn describe(&self, element: Option<&str>) -> String {
        format!("Assert that text in {} is '{}'", name(element), self.text)
    }

    fn value(&self) -> Option<String> {
        Some(self.text.clone())
    }

    fn lookup(&self) -> Lookup {
        Lookup::Present
    }

    async fn apply(&self, ctx: &EffectContext<'_>, target: Option<&ElementInfo>) -> Result<(), ActionError> {
        let target = ctx.require(target)?;
        let text = ctx.env.text_of(&target.handle).await?;
        if text.trim() != self.text {
            return Err(ActionError::EffectFailed(format!(
                "Text in element {} is not '{}'",
                ctx.element_name(),
                self.text
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AssertContainsText {
    pub text: String,
}

#[async_trait]
impl LeafEffect for AssertContainsText {
    fn kind(&self) -> &'static str {
        "AssertContainsText"
    }

    fn describe(&self, element: Option<&str>) -> String {
        format!("Assert that {} contains '{}'", name(element), self.text)
    }

    fn value(&self) -> Option<String> {
        Some(self.text.clone())
    }

    fn lookup(&self) -> Lookup {
        Lookup::Present
    }

    async fn apply(&self, ctx: &EffectContext<'_>, target: Option<&ElementInfo>) -> Result<(), ActionError> {
        let target = ctx.require(target)?;
        let text = ctx.env.text_of(&target.handle).await?;
        if !text.contains(&self.text) {
            return Err(ActionError::EffectFailed(format!(
                "Text in element {} doesn't contain '{}'",
                ctx.element_name(),
                self.text
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AssertValueIs {
    pub value: String,
}

#[async_trait]
impl LeafEffect for AssertValueIs {
    fn kind(&self) -> &'static str {
        "AssertValueIs"
    }

    fn describe(&self, element: Option<&str>) -> String {
        format!("Assert that value in {} is '{}'", name(element), self.value)
    }

    fn value(&self) -> Option<String> {
        Some(self.value.clone())
    }

    fn lookup(&self) -> Lookup {
        Lookup::Present
    }

    async fn apply(&self, ctx: &EffectContext<'_>, target: Option<&ElementInfo>) -> Result<(), ActionError> {
        let target = ctx.require(target)?;
        let value = ctx.env.value_of(&target.handle).await?;
        if value != self.value {
            return Err(ActionError::EffectFailed(format!(
                "Value in element {} is not '{}'",
                ctx.element_name(),
                self.value
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AssertExists;

#[async_trait]
impl LeafEffect for AssertExists {
    fn kind(&self) -> &'static str {
        "AssertExists"
    }

    fn describe(&self, element: Option<&str>) -> String {
        format!("Assert that {} exists", name(element))
    }

    fn lookup(&self) -> Lookup {
        Lookup::Present
    }

    async fn apply(&self, ctx: &EffectContext<'_>, target: Option<&ElementInfo>) -> Result<(), ActionError> {
        ctx.require(target).map(|_| ())
    }
}

#[derive(Debug, Clone)]
pub struct AssertNotExists;

#[async_trait]
impl LeafEffect for AssertNotExists {
    fn kind(&self) -> &'static str {
        "AssertNotExists"
    }

    fn describe(&self, element: Option<&str>) -> String {
        format!("Assert that {} doesn't exist", name(element))
    }

    fn lookup(&self) -> Lookup {
        Lookup::Absent
    }

    async fn apply(&self, ctx: &EffectContext<'_>, target: Option<&ElementInfo>) -> Result<(), ActionError> {
        match target {
            Some(_) => Err(ActionError::EffectFailed(format!(
                "Element {} was not expected to exist",
                ctx.element_name()
            ))),
            None => Ok(()),
        }
    }
}

/// Reads an input value and publishes it under a memory slot name.
#[derive(Debug, Clone)]
pub struct SaveValue {
    pub slot: String,
}

#[async_trait]
impl LeafEffect for SaveValue {
    fn kind(&self) -> &'static str {
        "SaveValue"
    }

    fn describe(&self, element: Option<&str>) -> String {
        format!("Save value of {} in {}", name(element), self.slot)
    }

    fn lookup(&self) -> Lookup {
        Lookup::Present
    }

    async fn apply(&self, ctx: &EffectContext<'_>, target: Option<&ElementInfo>) -> Result<(), ActionError> {
        let target = ctx.require(target)?;
        let value = ctx.env.value_of(&target.handle).await.map_err(|e| {
            ActionError::EffectFailed(format!(
                "{e}. Not able to save value from element {}",
                ctx.element_name()
            ))
        })?;
        let _ = ctx.events.send(Event::SaveValue {
            memory_slot_name: self.slot.clone(),
            value,
        });
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Wait {
    pub millis: u64,
}

#[async_trait]
impl LeafEffect for Wait {
    fn kind(&self) -> &'static str {
        "Wait"
    }

    fn describe(&self, _element: Option<&str>) -> String {
        format!("Wait {} milliseconds", self.millis)
    }

    async fn apply(&self, ctx: &EffectContext<'_>, _target: Option<&ElementInfo>) -> Result<(), ActionError> {
        ctx.clock.sleep(Duration::from_millis(self.millis)).await;
        Ok(())
    }
}

/// Succeeds once the element is gone. The lookup does all the work.
#[derive(Debug, Clone)]
pub struct WaitUntilRemoved;

#[async_trait]
impl LeafEffect for WaitUntilRemoved {
    fn kind(&self) -> &'static str {
        "WaitUntilElementRemoved"
    }

    fn describe(&self, element: Option<&str>) -> String {
        format!("Wait until {} is removed", name(element))
    }

    fn lookup(&self) -> Lookup {
        Lookup::Removed
    }

    async fn apply(&self, _ctx: &EffectContext<'_>, _target: Option<&ElementInfo>) -> Result<(), ActionError> {
        Ok(())
    }
}

/// Pauses playback; the run suspends at the next pause gate.
#[derive(Debug, Clone)]
pub struct Pause;

#[async_trait]
impl LeafEffect for Pause {
    fn kind(&self) -> &'static str {
        "Pause"
    }

    fn describe(&self, _element: Option<&str>) -> String {
        "Paused".to_string()
    }

    async fn apply(&self, ctx: &EffectContext<'_>, _target: Option<&ElementInfo>) -> Result<(), ActionError> {
        ctx.session.pause();
        Ok(())
    }
}

/// Waits for the operator to accept or reject a step done by hand.
#[derive(Debug, Clone)]
pub struct ManualStep {
    pub description: String,
}

#[async_trait]
impl LeafEffect for ManualStep {
    fn kind(&self) -> &'static str {
        "ManualStep"
    }

    fn describe(&self, _element: Option<&str>) -> String {
        format!("Manual Step: {}", self.description)
    }

    async fn apply(&self, ctx: &EffectContext<'_>, _target: Option<&ElementInfo>) -> Result<(), ActionError> {
        info!(step = %self.description, "Waiting manual step");
        match ctx.session.await_decision().await {
            Some(Decision::Accept) => Ok(()),
            Some(Decision::Reject) => Err(ActionError::EffectFailed(format!(
                "Manual step '{}' rejected",
                self.description
            ))),
            None => Err(ActionError::Aborted),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReloadPage;

#[async_trait]
impl LeafEffect for ReloadPage {
    fn kind(&self) -> &'static str {
        "ReloadPage"
    }

    fn describe(&self, _element: Option<&str>) -> String {
        "Reload page".to_string()
    }

    async fn apply(&self, ctx: &EffectContext<'_>, _target: Option<&ElementInfo>) -> Result<(), ActionError> {
        ctx.env.reload().await?;
        Ok(())
    }
}
