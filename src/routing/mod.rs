//! Routing module
//!
//! Client-side route table of the web front-end:
//! - Path to page component mapping
//! - Redirect resolution
//! - History mode selection

mod table;

pub use table::{
    normalize_path, HistoryMode, Page, Resolution, Route, RouteTable, RouteTableError,
    RouteTarget,
};
