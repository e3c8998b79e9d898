//! Greenlight Kanban Projection
//!
//! A derived, recomputable view of approval instances as a board.
//! Columns map `(status, stage)` combinations to lanes; cards carry
//! the live SLA view. The board is never a second source of truth:
//! the one write path, a manual card move, validates here and then
//! goes through the engine like every other transition.

#![deny(unsafe_code)]

mod card;
mod config;
mod projector;

pub use card::{compare_cards, KanbanCard};
pub use config::{BoardConfig, ColumnMapping, KanbanColumn, DEFAULT_TERMINAL_GRACE_SECS};
pub use projector::{build_board, move_card, validate_move, Board, BoardColumn, BoardSummary, StatusCounts};
