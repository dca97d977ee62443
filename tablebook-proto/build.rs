fn main() {
    tonic_build::configure()
        .compile_protos(
            &[
                "proto/common.proto",
                "proto/reservations.proto",
                "proto/submissions.proto",
            ],
            &["proto"],
        )
        .unwrap_or_else(|e| panic!("Failed to compile protos {:?}", e));
}
