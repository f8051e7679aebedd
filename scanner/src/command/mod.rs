//! The four command families the protocol is built from.
//!
//! Each family is a plain dispatch function over a [`Connexion`], not a
//! class hierarchy: the command bytes and any reply-policy quirks are
//! ordinary arguments rather than template parameters. This mirrors the
//! family split in the original command registry (action / getter / setter
//! / scan-start) without reproducing its per-command type for every one of
//! the ~40 concrete commands.

pub mod action;
pub mod getter;
pub mod scan_start;
pub mod setter;
