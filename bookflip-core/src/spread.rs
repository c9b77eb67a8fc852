use crate::{Page, Slot};

/// Left and right content shown together in one open-book view.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Spread<'a> {
    pub left: Option<&'a Slot>,
    pub right: Option<&'a Slot>,
}

impl<'a> Spread<'a> {
    pub const EMPTY: Self = Self {
        left: None,
        right: None,
    };

    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// The spreads a renderer needs around the current one.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpreadWindow<'a> {
    pub prev: Spread<'a>,
    pub current: Spread<'a>,
    pub next: Spread<'a>,
}

/// Out-of-range indices resolve to the empty spread; they are how callers peek past
/// either end of the book.
pub fn resolve(pages: &[Page], index: usize) -> Spread<'_> {
    match pages.get(index) {
        Some(page) => Spread {
            left: page.left.as_ref(),
            right: page.right.as_ref(),
        },
        None => Spread::EMPTY,
    }
}

pub fn resolve_window(pages: &[Page], current: usize) -> SpreadWindow<'_> {
    let prev = current
        .checked_sub(1)
        .map(|index| resolve(pages, index))
        .unwrap_or(Spread::EMPTY);
    let next = current
        .checked_add(1)
        .map(|index| resolve(pages, index))
        .unwrap_or(Spread::EMPTY);
    SpreadWindow {
        prev,
        current: resolve(pages, current),
        next,
    }
}
