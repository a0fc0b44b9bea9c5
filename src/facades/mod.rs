pub mod field_provider;
