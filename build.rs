fn main() {
    #[cfg(feature = "app")]
    {
        tauri_build::build();
    }

    println!("cargo:rerun-if-env-changed=BLACKEYE_SUPABASE_URL");
    println!("cargo:rerun-if-env-changed=BLACKEYE_SUPABASE_ANON_KEY");
}
