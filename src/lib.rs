pub mod constraints;
pub mod consts;
pub mod evolution;
pub mod frontier;
pub mod matrix;
pub mod portfolio;
pub mod returns;
pub mod weights;
