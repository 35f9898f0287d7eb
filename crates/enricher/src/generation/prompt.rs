//! Prompt text sent to the generation services.

use crate::catalog::{attribute, Attributes};

/// Prompt for a clean e-commerce product photo.
pub fn image_prompt(attributes: &Attributes) -> String {
    let name = attribute(attributes, "name").unwrap_or("product");
    let brand = attribute(attributes, "brand").unwrap_or("unbranded");
    let category = attribute(attributes, "category").unwrap_or("general merchandise");

    let mut prompt =
        String::from("Create a professional product image for an e-commerce listing:\n");
    prompt.push_str(&format!("Product: {}\n", name));
    prompt.push_str(&format!("Brand: {}\n", brand));
    match attribute(attributes, "department") {
        Some(department) => {
            prompt.push_str(&format!("Category: {} in {} department\n", category, department))
        }
        None => prompt.push_str(&format!("Category: {}\n", category)),
    }
    prompt.push_str("Style: Clean, well-lit product photography style with white background\n");
    prompt.push_str("Focus: Show the product clearly with attention to detail and key features");
    prompt
}

/// Prompt asking for persuasive shop copy about the attached image.
pub fn description_prompt(attributes: &Attributes) -> String {
    let brand = attribute(attributes, "brand").unwrap_or("Unknown Brand");
    let name = attribute(attributes, "name").unwrap_or_default();
    let category = attribute(attributes, "category").unwrap_or_default();

    let price_line = match attribute(attributes, "retail_price") {
        Some(price) => format!(
            "7. Unique selling points and value proposition (considering the retail price of ${})\n",
            price
        ),
        None => "7. Unique selling points and value proposition\n".to_string(),
    };

    format!(
        "Analyze this {brand} product image and provide a compelling e-commerce description that includes:\n\
         1. Product name: {name}\n\
         2. Brand highlights: Emphasize {brand}'s reputation and quality in the {category} category\n\
         3. Key product features and specifications\n\
         4. Materials and construction quality\n\
         5. Colors and design elements\n\
         6. Size and dimensions (if visible)\n\
         {price_line}\
         8. Target audience or use cases\n\
         9. Any visible brand elements or distinctive features\n\n\
         Focus on creating persuasive content that highlights the {brand} brand value \
         and helps shoppers make a confident purchase decision.",
    )
}
