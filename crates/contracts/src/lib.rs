//! Generated gRPC contracts for the platform services the agent talks to.

pub mod media {
    pub mod v1 {
        tonic::include_proto!("sentiric.media.v1");
    }
}

pub mod user {
    pub mod v1 {
        tonic::include_proto!("sentiric.user.v1");
    }
}

pub mod tts {
    pub mod v1 {
        tonic::include_proto!("sentiric.tts.v1");
    }
}

pub mod knowledge {
    pub mod v1 {
        tonic::include_proto!("sentiric.knowledge.v1");
    }
}

pub mod event {
    pub mod v1 {
        tonic::include_proto!("sentiric.event.v1");
    }
}
