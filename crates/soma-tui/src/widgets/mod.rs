pub mod channel_view;
pub mod filter_input;
pub mod status_bar;
