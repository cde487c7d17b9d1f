//! Transform handlers, grouped by the stage that registers them.
//!
//! | rank | handler |
//! |------|---------|
//! | 0.01 | [`OnlyIncludeHandler`] |
//! | 0.02 | [`IncludeOnlyHandler`] |
//! | 0.03 | [`NoIncludeHandler`] |
//! | 1.05 | [`TemplateArgHandler`] |
//! | 1.1  | [`TemplateHandler`] |
//! | 1.14 | [`BehaviorSwitchHandler`] |
//! | 1.15 | [`LinkHandler`] |
//! | 2.1  | [`QuoteHandler`] |
//! | 2.49 | [`ListHandler`] |
//! | 2.9  | [`TocHandler`] |

pub mod behavior_switch;
pub mod includes;
pub mod links;
pub mod lists;
pub mod quotes;
pub mod template;
pub mod template_args;
pub mod toc;

pub use behavior_switch::BehaviorSwitchHandler;
pub use includes::{IncludeOnlyHandler, NoIncludeHandler, OnlyIncludeHandler};
pub use links::LinkHandler;
pub use lists::ListHandler;
pub use quotes::QuoteHandler;
pub use template::TemplateHandler;
pub use template_args::TemplateArgHandler;
pub use toc::TocHandler;

use super::{TokenTransformManager, TransformError};
use crate::wiki::token::{Tag, Token};

/// Handlers for the synchronous input stage (ranks `[0, 1)`).
pub fn register_sync_input(manager: &mut TokenTransformManager) -> Result<(), TransformError> {
    OnlyIncludeHandler::register(manager)?;
    IncludeOnlyHandler::register(manager)?;
    NoIncludeHandler::register(manager)?;
    Ok(())
}

/// Handlers for the asynchronous expansion stage (ranks `[1, 2)`).
pub fn register_async_expansion(
    manager: &mut TokenTransformManager,
) -> Result<(), TransformError> {
    TemplateArgHandler::register(manager)?;
    TemplateHandler::register(manager)?;
    BehaviorSwitchHandler::register(manager)?;
    LinkHandler::register(manager)?;
    Ok(())
}

/// Handlers for the synchronous output stage (ranks `[2, 3)`).
pub fn register_sync_output(manager: &mut TokenTransformManager) -> Result<(), TransformError> {
    QuoteHandler::register(manager)?;
    ListHandler::register(manager)?;
    TocHandler::register(manager)?;
    Ok(())
}

/// Open tag that serializes to nothing on its own.
pub(crate) fn generated_open(name: &str) -> Tag {
    Tag::new(name).src("")
}

/// Close tag that serializes to nothing on its own.
pub(crate) fn generated_close(name: &str) -> Token {
    Token::TagClose(Tag::new(name).src(""))
}
