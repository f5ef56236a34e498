fn main() -> Result<(), Box<dyn std::error::Error>> {
    // embedded by sqlx::migrate!
    println!("cargo:rerun-if-changed=migrations");
    shadow()?;

    Ok(())
}

fn shadow() -> shadow_rs::SdResult<()> {
    shadow_rs::ShadowBuilder::builder().build()?;
    Ok(())
}
