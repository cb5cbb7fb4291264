// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Spintax expansion: `{a|b|c}` groups are replaced by one random option.
//!
//! Groups do not nest. A group is a `{`, one or more characters that are
//! not braces, and a `}`. Anything else, including unbalanced braces and
//! `{}`, is left verbatim. Expanded text is not scanned again.

use std::sync::LazyLock;

use rand::Rng;
use regex::{Captures, Regex};

static GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("spintax group pattern is valid"));

/// Expands `template` with the thread-local RNG.
pub fn expand(template: &str) -> String {
    expand_with(template, &mut rand::thread_rng())
}

/// Expands `template`, drawing each choice uniformly from `rng`.
pub fn expand_with<R: Rng + ?Sized>(template: &str, rng: &mut R) -> String {
    GROUP
        .replace_all(template, |caps: &Captures<'_>| {
            let options: Vec<&str> = caps[1].split('|').collect();
            options[rng.gen_range(0..options.len())].to_string()
        })
        .into_owned()
}
