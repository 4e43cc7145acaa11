//! # Kernel Memory Configuration
//!
//! Compile-time constants shared by the paging crates. They are the single
//! source of truth for page geometry and for the defaults of the DIRQL
//! mapping pool.
//!
//! ## Virtual Memory Architecture
//!
//! Two-level, non-PAE paging splits a 32-bit virtual address into three fields:
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | Directory | Table | Offset |
//! ```
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │         User Space              │
//! 0x8000_0000 ├─────────────────────────────────┤ KERNEL_DIRECTORY_START
//!             │        Kernel Space             │
//! 0xFF80_0000 ├─────────────────────────────────┤ DIRQL_WINDOW
//!             │   DIRQL temporary mappings      │
//! 0xFFC0_0000 ├─────────────────────────────────┤
//!             │        Kernel Space             │
//! 0xFFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! The constants are `const` values checked by compile-time assertions.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
