//! Behavior switches (`__NOTOC__`, `__FORCETOC__`, ...).
//!
//! The magic word in the token's first attribute is recorded as `true` in the
//! environment and the token is consumed. The rank keeps this ahead of every handler that
//! reads those flags.

use crate::wiki::token::{Token, TokenKind, BEHAVIOR_SWITCH};
use crate::wiki::transforms::{
    HandlerId, TokenHandler, TokenTransformManager, TransformContext, TransformError,
    TransformOutcome,
};

pub struct BehaviorSwitchHandler;

impl BehaviorSwitchHandler {
    pub const RANK: f64 = 1.14;

    pub fn register(manager: &mut TokenTransformManager) -> Result<HandlerId, TransformError> {
        let id = manager.add_handler(Box::new(Self));
        manager.add_transform(
            id,
            Self::RANK,
            TokenKind::BehaviorSwitch,
            Some(BEHAVIOR_SWITCH),
        )?;
        Ok(id)
    }
}

impl TokenHandler for BehaviorSwitchHandler {
    fn name(&self) -> &'static str {
        "behavior-switch"
    }

    fn on_token(
        &mut self,
        token: &Token,
        ctx: &mut TransformContext<'_>,
    ) -> Result<TransformOutcome, TransformError> {
        let word = token
            .attrs()
            .and_then(|attrs| attrs.first())
            .map(|attr| attr.value.clone())
            .ok_or_else(|| TransformError::Handler {
                handler: self.name().to_string(),
                message: "behavior switch without a magic word".to_string(),
            })?;
        ctx.env.set_variable(word, true);
        Ok(TransformOutcome::drop())
    }
}
