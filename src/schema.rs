table! {
    teams (id) {
        id -> Uuid,
        name -> Text,
        code -> Text,
        emoji -> Text,
        guild_id -> Int8,
        external_page -> Nullable<Text>,
        bot_created -> Bool,
    }
}

table! {
    tournaments (id) {
        id -> Uuid,
        name -> Text,
        channel_id -> Int8,
        guild_id -> Int8,
        message_id -> Int8,
        status -> Int2,
        external_page -> Nullable<Text>,
        updates_channel_id -> Nullable<Int8>,
        score_bo1_team -> Int2,
        score_bo3_team -> Int2,
        score_bo3_games -> Int2,
        score_bo5_team -> Int2,
        score_bo5_games -> Int2,
    }
}

table! {
    matches (id) {
        id -> Uuid,
        sequence -> Int4,
        name -> Text,
        message_id -> Int8,
        status -> Int2,
        best_of -> Int2,
        team1_id -> Uuid,
        team2_id -> Uuid,
        tournament_id -> Uuid,
        result -> Int2,
        games_played -> Int2,
        external_match_id -> Nullable<Text>,
        external_tab -> Nullable<Text>,
    }
}

table! {
    users (id) {
        id -> Uuid,
        discord_id -> Int8,
        name -> Text,
    }
}

table! {
    predictions (id) {
        id -> Uuid,
        user_id -> Uuid,
        match_id -> Uuid,
        team -> Int2,
        games -> Int2,
    }
}

joinable!(matches -> tournaments (tournament_id));
joinable!(predictions -> matches (match_id));
joinable!(predictions -> users (user_id));

allow_tables_to_appear_in_same_query!(
    teams,
    tournaments,
    matches,
    users,
    predictions,
);
