//! Control-plane implementations

mod aws;

pub use aws::AwsControlPlane;
