//! Rank-ordered token dispatch for one pipeline stage.
//!
//! Registrations are kept sorted by `(rank, sequence)`, where `sequence` is the order of
//! registration, so equal ranks run first-registered first. A token entering the stage
//! starts at the first registration; a replacement emitted by the registration at index
//! `k` resumes at index `k + 1`, so it never revisits handlers that already saw its
//! position.

use super::{
    Expander, Frame, TokenHandler, TransformContext, TransformError, TransformOutcome,
};
use crate::wiki::env::{DiagnosticKind, Environment};
use crate::wiki::token::{Token, TokenKind};
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};

const TARGET: &str = "wikidom::transform";

/// Opaque reference to a handler added to a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(usize);

/// Which token kinds a registration applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMatch {
    Any,
    Kind(TokenKind),
}

impl From<TokenKind> for TokenMatch {
    fn from(kind: TokenKind) -> Self {
        TokenMatch::Kind(kind)
    }
}

#[derive(Debug, Clone)]
struct Registration {
    rank: f64,
    sequence: usize,
    matcher: TokenMatch,
    tag: Option<String>,
    handler: HandlerId,
}

impl Registration {
    fn matches(&self, token: &Token) -> bool {
        let kind_ok = match self.matcher {
            TokenMatch::Any => true,
            TokenMatch::Kind(kind) => token.kind() == kind,
        };
        kind_ok
            && match &self.tag {
                None => true,
                Some(tag) => token.name() == Some(tag.as_str()),
            }
    }
}

pub struct TokenTransformManager {
    name: &'static str,
    ranks: Range<f64>,
    handlers: Vec<Box<dyn TokenHandler>>,
    registrations: Vec<Registration>,
    next_sequence: usize,
}

impl TokenTransformManager {
    /// Create a stage that accepts registrations with `ranks.start <= rank < ranks.end`.
    pub fn new(name: &'static str, ranks: Range<f64>) -> Self {
        Self {
            name,
            ranks,
            handlers: Vec::new(),
            registrations: Vec::new(),
            next_sequence: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ranks(&self) -> Range<f64> {
        self.ranks.clone()
    }

    pub fn add_handler(&mut self, handler: Box<dyn TokenHandler>) -> HandlerId {
        self.handlers.push(handler);
        HandlerId(self.handlers.len() - 1)
    }

    /// Register `handler` for tokens matching `matcher` (and `tag`, when given) at `rank`.
    pub fn add_transform(
        &mut self,
        handler: HandlerId,
        rank: f64,
        matcher: impl Into<TokenMatch>,
        tag: Option<&str>,
    ) -> Result<(), TransformError> {
        if handler.0 >= self.handlers.len() {
            return Err(TransformError::UnknownHandler(handler.0));
        }
        if !(rank >= self.ranks.start && rank < self.ranks.end) {
            return Err(TransformError::RankOutOfRange {
                rank,
                min: self.ranks.start,
                max: self.ranks.end,
            });
        }
        let registration = Registration {
            rank,
            sequence: self.next_sequence,
            matcher: matcher.into(),
            tag: tag.map(str::to_string),
            handler,
        };
        self.next_sequence += 1;

        let position = self.registrations.partition_point(|existing| {
            existing.rank < registration.rank
                || (existing.rank == registration.rank
                    && existing.sequence < registration.sequence)
        });
        self.registrations.insert(position, registration);
        Ok(())
    }

    /// Push `tokens` through every matching registration and return the rewritten stream.
    pub async fn apply_transforms(
        &mut self,
        tokens: Vec<Token>,
        env: &mut Environment,
        frame: &Frame,
        source: &str,
        expander: &dyn Expander,
    ) -> Vec<Token> {
        let mut output = Vec::with_capacity(tokens.len());
        // Pending work in reverse stream order: (token, first registration to try).
        let mut work: Vec<(Token, usize)> = Vec::new();

        for token in tokens {
            work.push((token, 0));
            while let Some((token, start)) = work.pop() {
                match self
                    .dispatch(&token, start, env, frame, source, expander)
                    .await
                {
                    Some((next, replacement)) => {
                        for replaced in replacement.into_iter().rev() {
                            work.push((replaced, next));
                        }
                    }
                    None => output.push(token),
                }
            }
        }

        output
    }

    /// Run `token` through registrations from `start` on. Returns `None` when the token
    /// survives every handler, or the replacement and the index it resumes at.
    async fn dispatch(
        &mut self,
        token: &Token,
        start: usize,
        env: &mut Environment,
        frame: &Frame,
        source: &str,
        expander: &dyn Expander,
    ) -> Option<(usize, Vec<Token>)> {
        let mut index = start;
        while let Some(k) = self.next_match(token, index) {
            let registration = self.registrations[k].clone();
            if env.options().trace {
                log::trace!(
                    target: TARGET,
                    "[{}] {} -> {} (rank {})",
                    self.name,
                    token,
                    self.handlers[registration.handler.0].name(),
                    registration.rank
                );
            }

            let outcome = self.invoke(registration.handler, token, env, frame, source, |h, t, c| {
                h.on_token(t, c)
            });
            let outcome = match outcome {
                Some(TransformOutcome::Suspend(request)) => {
                    log::debug!(
                        target: TARGET,
                        "[{}] {} suspended on {}",
                        self.name,
                        self.handlers[registration.handler.0].name(),
                        request.target
                    );
                    let result = expander.expand(&request, env).await;
                    match self.invoke(registration.handler, token, env, frame, source, |h, t, c| {
                        h.resume(t, result, c)
                    }) {
                        Some(TransformOutcome::Suspend(_)) => {
                            self.fault(
                                env,
                                registration.handler,
                                TransformError::Error("suspended twice".to_string()),
                            );
                            None
                        }
                        other => other,
                    }
                }
                other => other,
            };

            match outcome {
                Some(TransformOutcome::Replace(tokens)) => return Some((k + 1, tokens)),
                Some(TransformOutcome::Unchanged) | None => index = k + 1,
                Some(TransformOutcome::Suspend(_)) => index = k + 1,
            }
        }
        None
    }

    fn next_match(&self, token: &Token, from: usize) -> Option<usize> {
        (from..self.registrations.len()).find(|&k| self.registrations[k].matches(token))
    }

    /// Call a handler, absorbing errors and panics. `None` means the token passes unchanged.
    fn invoke<F>(
        &mut self,
        handler: HandlerId,
        token: &Token,
        env: &mut Environment,
        frame: &Frame,
        source: &str,
        call: F,
    ) -> Option<TransformOutcome>
    where
        F: FnOnce(
            &mut dyn TokenHandler,
            &Token,
            &mut TransformContext<'_>,
        ) -> Result<TransformOutcome, TransformError>,
    {
        let name = self.handlers[handler.0].name();
        let result = {
            let mut ctx = TransformContext {
                env: &mut *env,
                frame,
                source,
            };
            let target = self.handlers[handler.0].as_mut();
            catch_unwind(AssertUnwindSafe(|| call(target, token, &mut ctx)))
        };
        match result {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(err)) => {
                self.fault(env, handler, err);
                None
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                self.fault(
                    env,
                    handler,
                    TransformError::Panicked {
                        handler: name.to_string(),
                        message,
                    },
                );
                None
            }
        }
    }

    fn fault(&self, env: &mut Environment, handler: HandlerId, err: TransformError) {
        let name = self.handlers[handler.0].name();
        log::warn!(target: TARGET, "[{}] {}: {}", self.name, name, err);
        env.report(DiagnosticKind::Transform, format!("{}: {}", name, err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::env::EnvOptions;
    use crate::wiki::transforms::NoExpansion;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl TokenHandler for Recorder {
        fn name(&self) -> &'static str {
            self.label
        }

        fn on_token(
            &mut self,
            _token: &Token,
            _ctx: &mut TransformContext<'_>,
        ) -> Result<TransformOutcome, TransformError> {
            self.log.lock().unwrap().push(self.label);
            Ok(TransformOutcome::Unchanged)
        }
    }

    /// Replaces text "a" with "b" "c".
    struct Splitter;

    impl TokenHandler for Splitter {
        fn name(&self) -> &'static str {
            "splitter"
        }

        fn on_token(
            &mut self,
            token: &Token,
            _ctx: &mut TransformContext<'_>,
        ) -> Result<TransformOutcome, TransformError> {
            if token.text_value() == Some("a") {
                Ok(TransformOutcome::Replace(vec![
                    Token::text("b"),
                    Token::text("c"),
                ]))
            } else {
                Ok(TransformOutcome::Unchanged)
            }
        }
    }

    struct Failing;

    impl TokenHandler for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn on_token(
            &mut self,
            _token: &Token,
            _ctx: &mut TransformContext<'_>,
        ) -> Result<TransformOutcome, TransformError> {
            Err(TransformError::Error("boom".into()))
        }
    }

    struct Panicking;

    impl TokenHandler for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn on_token(
            &mut self,
            _token: &Token,
            _ctx: &mut TransformContext<'_>,
        ) -> Result<TransformOutcome, TransformError> {
            panic!("handler bug")
        }
    }

    async fn run(manager: &mut TokenTransformManager, tokens: Vec<Token>) -> (Vec<Token>, Environment) {
        let mut env = Environment::new(EnvOptions::default());
        let out = manager
            .apply_transforms(tokens, &mut env, &Frame::page(), "", &NoExpansion)
            .await;
        (out, env)
    }

    fn recorder(
        manager: &mut TokenTransformManager,
        label: &'static str,
        rank: f64,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) {
        let id = manager.add_handler(Box::new(Recorder {
            label,
            log: log.clone(),
        }));
        manager
            .add_transform(id, rank, TokenMatch::Any, None)
            .unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_follows_rank_then_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = TokenTransformManager::new("test", 1.0..2.0);
        recorder(&mut manager, "late", 1.5, &log);
        recorder(&mut manager, "early", 1.1, &log);
        recorder(&mut manager, "tie-first", 1.3, &log);
        recorder(&mut manager, "tie-second", 1.3, &log);

        run(&mut manager, vec![Token::text("x")]).await;
        assert_eq!(
            *log.lock().unwrap(),
            vec!["early", "tie-first", "tie-second", "late"]
        );
    }

    #[tokio::test]
    async fn test_tag_filter() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = TokenTransformManager::new("test", 0.0..1.0);
        let id = manager.add_handler(Box::new(Recorder {
            label: "span-only",
            log: log.clone(),
        }));
        manager
            .add_transform(id, 0.5, TokenKind::TagOpen, Some("span"))
            .unwrap();

        run(
            &mut manager,
            vec![
                Token::open(crate::wiki::token::Tag::new("b")),
                Token::open(crate::wiki::token::Tag::new("span")),
                Token::close("span"),
            ],
        )
        .await;
        assert_eq!(*log.lock().unwrap(), vec!["span-only"]);
    }

    #[tokio::test]
    async fn test_replacements_skip_earlier_handlers_only() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = TokenTransformManager::new("test", 1.0..2.0);
        recorder(&mut manager, "before", 1.1, &log);
        let id = manager.add_handler(Box::new(Splitter));
        manager.add_transform(id, 1.2, TokenMatch::Any, None).unwrap();
        recorder(&mut manager, "same-rank-after", 1.2, &log);
        recorder(&mut manager, "after", 1.3, &log);

        let (out, _) = run(&mut manager, vec![Token::text("a")]).await;
        let texts: Vec<_> = out.iter().filter_map(|t| t.text_value()).collect();
        assert_eq!(texts, vec!["b", "c"]);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "before",
                "same-rank-after",
                "after",
                "same-rank-after",
                "after"
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_handler_passes_token_through() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = TokenTransformManager::new("test", 0.0..1.0);
        let id = manager.add_handler(Box::new(Failing));
        manager.add_transform(id, 0.1, TokenMatch::Any, None).unwrap();
        let id = manager.add_handler(Box::new(Panicking));
        manager.add_transform(id, 0.2, TokenMatch::Any, None).unwrap();
        recorder(&mut manager, "after", 0.3, &log);

        let (out, env) = run(&mut manager, vec![Token::text("keep")]).await;
        assert_eq!(out, vec![Token::text("keep")]);
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
        assert_eq!(env.diagnostics().len(), 2);
        assert!(env.diagnostics()[1].message.contains("handler bug"));
    }

    #[test]
    fn test_rank_outside_stage_is_rejected() {
        let mut manager = TokenTransformManager::new("test", 1.0..2.0);
        let id = manager.add_handler(Box::new(Splitter));
        assert!(matches!(
            manager.add_transform(id, 2.0, TokenMatch::Any, None),
            Err(TransformError::RankOutOfRange { .. })
        ));
        assert!(manager.add_transform(id, 1.0, TokenMatch::Any, None).is_ok());
        assert!(matches!(
            manager.add_transform(HandlerId(7), 1.5, TokenMatch::Any, None),
            Err(TransformError::UnknownHandler(7))
        ));
    }
}
