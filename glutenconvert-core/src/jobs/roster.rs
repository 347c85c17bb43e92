//! Recipe title roster
//!
//! Deterministic titles for the batch generation job. Each category cycles
//! through a fixed base list; once the list is exhausted the title gains a
//! style suffix, so all 100 titles per category are distinct.

use crate::types::RecipeCategory;

const BREAKFAST: &[&str] = &[
    "Blueberry Pancakes",
    "Banana Pancakes",
    "Strawberry Pancakes",
    "Chocolate Chip Pancakes",
    "Vanilla Pancakes",
    "Belgian Waffles",
    "Cinnamon Waffles",
    "Berry Waffles",
    "Protein Waffles",
    "Coconut Waffles",
    "Blueberry Muffins",
    "Banana Muffins",
    "Chocolate Muffins",
    "Lemon Muffins",
    "Apple Muffins",
    "Berry Smoothie Bowl",
    "Tropical Smoothie Bowl",
    "Green Smoothie Bowl",
    "Protein Smoothie Bowl",
    "Acai Bowl",
    "Scrambled Eggs",
    "Cheese Omelette",
    "Veggie Omelette",
    "Herb Omelette",
    "Spanish Omelette",
    "Avocado Toast",
    "Cinnamon Toast",
    "Banana Toast",
    "Almond Butter Toast",
    "Honey Toast",
    "Granola Bowl",
    "Quinoa Breakfast Bowl",
    "Chia Pudding",
    "Overnight Oats",
    "Breakfast Burrito",
    "French Toast",
    "Breakfast Hash",
    "Egg Benedict",
    "Breakfast Sandwich",
    "Fruit Salad",
];

const SNACK: &[&str] = &[
    "Energy Balls",
    "Protein Balls",
    "Chocolate Balls",
    "Coconut Balls",
    "Almond Balls",
    "Trail Mix",
    "Nut Mix",
    "Dried Fruit Mix",
    "Seed Mix",
    "Granola Mix",
    "Protein Bars",
    "Energy Bars",
    "Fruit Bars",
    "Nut Bars",
    "Chocolate Bars",
    "Hummus Dip",
    "Veggie Dip",
    "Bean Dip",
    "Cheese Dip",
    "Avocado Dip",
    "Kale Chips",
    "Sweet Potato Chips",
    "Beet Chips",
    "Apple Chips",
    "Banana Chips",
    "Cookies",
    "Crackers",
    "Biscuits",
    "Muffins",
    "Brownies",
    "Smoothie",
    "Shake",
    "Juice",
    "Tea",
    "Latte",
];

const LUNCH: &[&str] = &[
    "Greek Salad",
    "Caesar Salad",
    "Garden Salad",
    "Quinoa Salad",
    "Pasta Salad",
    "Chicken Soup",
    "Vegetable Soup",
    "Lentil Soup",
    "Tomato Soup",
    "Mushroom Soup",
    "Turkey Sandwich",
    "Chicken Sandwich",
    "Veggie Sandwich",
    "BLT Sandwich",
    "Club Sandwich",
    "Chicken Wrap",
    "Turkey Wrap",
    "Veggie Wrap",
    "Tuna Wrap",
    "Salmon Wrap",
    "Pasta Primavera",
    "Chicken Pasta",
    "Seafood Pasta",
    "Veggie Pasta",
    "Pesto Pasta",
    "Chicken Curry",
    "Vegetable Curry",
    "Thai Curry",
    "Indian Curry",
    "Coconut Curry",
    "Fish Tacos",
    "Chicken Tacos",
    "Beef Tacos",
    "Veggie Tacos",
    "Shrimp Tacos",
    "Veggie Burger",
    "Turkey Burger",
    "Salmon Burger",
    "Black Bean Burger",
    "Quinoa Burger",
];

const DINNER: &[&str] = &[
    "Grilled Chicken",
    "Roasted Chicken",
    "Baked Chicken",
    "Fried Chicken",
    "BBQ Chicken",
    "Grilled Salmon",
    "Baked Salmon",
    "Pan Seared Salmon",
    "Teriyaki Salmon",
    "Lemon Salmon",
    "Beef Steak",
    "Grilled Steak",
    "Ribeye Steak",
    "Sirloin Steak",
    "Filet Mignon",
    "Pork Chops",
    "Grilled Pork",
    "Roasted Pork",
    "BBQ Pork",
    "Pork Tenderloin",
    "Stuffed Peppers",
    "Stuffed Zucchini",
    "Stuffed Mushrooms",
    "Stuffed Tomatoes",
    "Stuffed Squash",
    "BBQ Ribs",
    "Beef Ribs",
    "Pork Ribs",
    "Spare Ribs",
    "Short Ribs",
    "Grilled Shrimp",
    "Garlic Shrimp",
    "Coconut Shrimp",
    "Spicy Shrimp",
    "Lemon Shrimp",
    "Lamb Chops",
    "Roasted Lamb",
    "Grilled Lamb",
    "Mediterranean Lamb",
    "Herb Crusted Lamb",
];

fn bases(category: RecipeCategory) -> &'static [&'static str] {
    match category {
        RecipeCategory::Breakfast => BREAKFAST,
        RecipeCategory::Snack => SNACK,
        RecipeCategory::Lunch => LUNCH,
        RecipeCategory::Dinner => DINNER,
    }
}

/// Title for the `index`-th recipe of a category (0-based).
///
/// Stable across runs, so a resumed job continues with the titles the
/// interrupted run would have produced next.
pub fn recipe_title(category: RecipeCategory, index: usize) -> String {
    let bases = bases(category);
    let base = bases[index % bases.len()];
    let variation = index / bases.len() + 1;

    if variation == 1 {
        format!("Gluten-Free {}", base)
    } else {
        format!("Gluten-Free {} (Style {})", base, variation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CATEGORY_TARGET;
    use std::collections::HashSet;

    #[test]
    fn test_first_pass_has_no_style_suffix() {
        assert_eq!(
            recipe_title(RecipeCategory::Breakfast, 0),
            "Gluten-Free Blueberry Pancakes"
        );
        assert_eq!(
            recipe_title(RecipeCategory::Dinner, 39),
            "Gluten-Free Herb Crusted Lamb"
        );
    }

    #[test]
    fn test_later_passes_are_suffixed() {
        assert_eq!(
            recipe_title(RecipeCategory::Breakfast, 40),
            "Gluten-Free Blueberry Pancakes (Style 2)"
        );
        assert_eq!(
            recipe_title(RecipeCategory::Snack, 35),
            "Gluten-Free Energy Balls (Style 2)"
        );
    }

    #[test]
    fn test_titles_unique_within_quota() {
        for category in RecipeCategory::ALL {
            let titles: HashSet<String> = (0..CATEGORY_TARGET as usize)
                .map(|i| recipe_title(category, i))
                .collect();
            assert_eq!(titles.len(), CATEGORY_TARGET as usize);
        }
    }
}
