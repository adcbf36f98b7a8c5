fn main() {
    prost_build::compile_protos(&["proto/kad.proto"], &["proto/"])
        .expect("failed to compile kad.proto");
}
