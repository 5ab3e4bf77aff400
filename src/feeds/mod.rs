pub mod deribit;
