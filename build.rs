//! Compiles the CUDA kernels via nvcc when the `cuda` feature is enabled.
//!
//! The cc crate drives nvcc to compile kernels/escuchar_kernels.cu into an
//! object file linked into the final binary, and the CUDA runtime plus
//! cuBLAS are linked dynamically from the toolkit installation.

fn main() {
    #[cfg(feature = "cuda")]
    {
        let cuda_path =
            std::env::var("CUDA_PATH").unwrap_or_else(|_| "/usr/local/cuda".to_string());

        cc::Build::new()
            .cuda(true)
            .cudart("shared")
            .flag("-O2")
            .include(format!("{cuda_path}/include"))
            .file("kernels/escuchar_kernels.cu")
            .compile("escuchar_cuda_kernels");

        println!("cargo:rustc-link-search=native={cuda_path}/lib64");
        println!("cargo:rustc-link-lib=dylib=cudart");
        println!("cargo:rustc-link-lib=dylib=cublas");
        println!("cargo:rerun-if-changed=kernels/escuchar_kernels.cu");
    }
}
