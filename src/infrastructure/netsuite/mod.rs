pub mod netsuite_client;
