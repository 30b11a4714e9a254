//! Common element filters for [`ElementDescriptor::matching`].
//!
//! [`ElementDescriptor::matching`]: crate::locator::ElementDescriptor::matching

use std::sync::Arc;

use super::{ElementFilter, ElementInfo};

pub fn class_includes(class: impl Into<String>) -> ElementFilter {
    let class = class.into();
    Arc::new(move |info: &ElementInfo, _: usize| info.classes.iter().any(|c| *c == class))
}

pub fn inner_text_is(text: impl Into<String>) -> ElementFilter {
    let text = text.into();
    Arc::new(move |info: &ElementInfo, _: usize| info.text == text)
}

pub fn inner_text_contains(text: impl Into<String>) -> ElementFilter {
    let text = text.into();
    Arc::new(move |info: &ElementInfo, _: usize| info.text.contains(&text))
}

/// Accepts only the match at `position` among the visible matches.
pub fn nth(position: usize) -> ElementFilter {
    Arc::new(move |_: &ElementInfo, index: usize| index == position)
}

/// Accepts elements matching both filters.
pub fn and(first: ElementFilter, second: ElementFilter) -> ElementFilter {
    Arc::new(move |info: &ElementInfo, index: usize| first(info, index) && second(info, index))
}
