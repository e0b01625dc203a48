pub mod payments;
pub mod whatsapp;
