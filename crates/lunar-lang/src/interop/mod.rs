pub mod host;
pub mod converters;
pub mod conversions;
pub mod descriptor;
pub mod registry;
