fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(false)
        .compile_protos(
            &[
                "proto/sentiric/media/v1/media.proto",
                "proto/sentiric/user/v1/user.proto",
                "proto/sentiric/tts/v1/tts.proto",
                "proto/sentiric/knowledge/v1/knowledge.proto",
                "proto/sentiric/event/v1/event.proto",
            ],
            &["proto"],
        )?;
    Ok(())
}
