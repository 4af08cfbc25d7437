pub mod fixtures;
pub mod mock_transfer;
pub mod prepare_env;
