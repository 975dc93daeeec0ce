pub mod paypal_client;
