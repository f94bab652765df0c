pub mod numeric;
pub mod wrapper;
