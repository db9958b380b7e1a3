pub mod assignment;
pub mod provider;
pub mod request;
pub mod routing;
