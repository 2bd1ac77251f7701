pub mod cipher;
pub mod db_utils;
pub mod pagination;
