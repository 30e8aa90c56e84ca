pub mod asset;
pub mod draft;
pub mod work_order;
