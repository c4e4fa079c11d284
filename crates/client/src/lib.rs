pub mod net;

pub use net::{
    ClientConfig, ClientError, ClientStats, ConstantInput, InputSource, NetworkClient,
};
