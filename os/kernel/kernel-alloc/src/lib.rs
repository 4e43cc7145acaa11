//! # DIRQL-safe Temporary Mappings
//!
//! Code running at an elevated interrupt level (DIRQL) may not fault, block
//! or call into the general-purpose allocator, yet it still needs to look at
//! arbitrary physical frames, most prominently page-directory and page-table
//! entries. This crate provides a pre-reserved pool of mapping slots for
//! exactly that purpose.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │            DIRQL Entry Resolver (dirql)             │
//! │    • map_in_pde_dirql / map_in_pte_dirql            │
//! │    • slots returned on map-out or drop              │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │             DIRQL Page Pool (pool)                  │
//! │    • one owned page table behind a 4 MiB window     │
//! │    • bitmap of handed-out slots                     │
//! │    • no allocation, locking or faulting after init  │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │     Host primitives (`kernel-vmem` traits)          │
//! │    • PhysMapper / FrameAlloc (passive level)        │
//! │    • Mmu: invlpg, virtual → pointer (any level)     │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! 1. [`PagingContext::init_mapping_operations`] at passive level reserves the
//!    slot table and backing frames and claims the window's directory entry.
//! 2. [`PagingContext::alloc_page`], [`PagingContext::map_frame`] and
//!    [`PagingContext::free_page`] (and the [`dirql`] resolver built on them)
//!    at any level.
//! 3. [`PagingContext::end_mapping_operations`] at passive level hands
//!    everything back.
//!
//! ## Concurrency
//!
//! A context has no internal synchronization and is `!Sync`. Give every
//! concurrent actor (e.g. every logical processor) its own context; each one
//! claims its own 4 MiB window.
//!
//! ## Configuration
//!
//! [`MappingConfig`] defaults to `kernel_info::memory::DIRQL_DEFAULT_PAGES`
//! pages behind `kernel_info::memory::DIRQL_WINDOW`.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod config;
pub mod dirql;
pub mod pool;

pub use crate::config::MappingConfig;
pub use crate::dirql::{DirqlEntry, DirqlPde, DirqlPte, PoolExhausted};
pub use crate::pool::{InitMappingError, PagingContext, PoolPage};
