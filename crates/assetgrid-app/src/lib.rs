// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod api;
pub mod cell;
pub mod column_order;
pub mod dates;
pub mod dispatch;
pub mod forms;
pub mod ids;
pub mod model;
pub mod state;
pub mod table;

pub use api::*;
pub use cell::*;
pub use column_order::*;
pub use dates::*;
pub use dispatch::*;
pub use forms::*;
pub use ids::*;
pub use model::*;
pub use state::*;
pub use table::*;
