//! Core trait definitions

mod control_plane;
mod process;

pub use control_plane::{
    ContainerInfo, ControlPlane, ExecuteCommandRequest, TaskDescription, TaskFailureInfo, TaskInfo,
};
pub use process::{ProcessSpawner, ProcessSpec, SpawnedProcess};
